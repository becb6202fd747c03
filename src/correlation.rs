use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tag shared by every message of one call.
///
/// The client mints one per `call`, `command` or stream and both sides echo
/// it in the `correlationId` field. On the wire it is a bare JSON string, so
/// identifiers minted by other clients (any string) are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint an identifier for a new call (random uuid v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_many_calls_never_share_an_id() {
        // ---
        let ids: HashSet<CorrelationId> = (0..1000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_foreign_ids_survive_the_wire() {
        // ---
        let id: CorrelationId = serde_json::from_str("\"panel-7:req-42\"").unwrap();
        assert_eq!(id.as_str(), "panel-7:req-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"panel-7:req-42\"");
    }
}

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Stable identity of one host-side session (a panel or client context).
///
/// Streams opened by a session are stored under this identity so that the
/// whole set can be terminated when the session goes away. The label is for
/// logs only and takes no part in equality.
#[derive(Debug, Clone)]
pub struct SessionId {
    id: Arc<str>,
    label: Arc<str>,
}

impl SessionId {
    /// Generate a fresh session identity with a human-readable label.
    pub fn generate(label: impl Into<Arc<str>>) -> Self {
        Self {
            id: Arc::from(Uuid::new_v4().to_string()),
            label: label.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionId {}

impl std::hash::Hash for SessionId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_same_label_distinct_sessions() {
        // ---
        let a = SessionId::generate("Thing Panel");
        let b = SessionId::generate("Thing Panel");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}

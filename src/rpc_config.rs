//! Public, channel-agnostic relay configuration.
//!
//! This type intentionally contains no transport-specific concepts. Channel
//! implementations read only the fields that apply to them.

use std::time::Duration;

/// Relay configuration shared by clients, hosts and channels.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Identifier of this endpoint, used for logging.
    pub endpoint_id: String,

    /// Number of frames a channel direction buffers before `post()` waits.
    /// Zero is read as one.
    ///
    /// Default: 64
    pub channel_capacity: usize,

    /// Discriminant in a unary reply's `code` field that marks success.
    ///
    /// Default: 1
    pub success_code: i64,

    /// Optional bound on how long a unary call or command waits to settle.
    ///
    /// When `None`, a call whose reply never arrives stays registered until
    /// its channel goes away.
    ///
    /// Default: `None`
    pub request_timeout: Option<Duration>,

    /// Buffer size of the event queue behind each in-process stream.
    /// Zero is read as one.
    ///
    /// Default: 32
    pub stream_event_capacity: usize,
}

impl RpcConfig {
    /// Create a config with defaults for the given endpoint.
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            ..Self::default()
        }
    }

    /// Set the per-direction channel buffer size.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the unary success discriminant.
    pub fn with_success_code(mut self, code: i64) -> Self {
        self.success_code = code;
        self
    }

    /// Bound unary calls and commands with a timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_rpc::RpcConfig;
    /// use std::time::Duration;
    ///
    /// let config = RpcConfig::new("panel").with_request_timeout(Duration::from_secs(10));
    /// assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
    /// ```
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the event buffer size of in-process streams.
    pub fn with_stream_event_capacity(mut self, capacity: usize) -> Self {
        self.stream_event_capacity = capacity.max(1);
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint_id: "relay".to_string(),
            channel_capacity: 64,
            success_code: 1,
            request_timeout: None,
            stream_event_capacity: 32,
        }
    }
}

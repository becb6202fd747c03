//! Host dispatcher builder.
//!
//! Provides a fluent builder API for wiring a [`HostDispatcher`] to its
//! remote-procedure capability and local command handlers.

use std::collections::HashMap;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::host::{wrap_command, CommandHandler};
use crate::{CommandContext, HostDispatcher, InvokerPtr, Result, RpcConfig};

/// Builder for creating host dispatchers.
///
/// Command handlers are registered up front; the dispatcher's command table
/// is read-only once built.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use relay_rpc::{CommandContext, HostDispatcherBuilder, LocalServices, RpcConfig};
///
/// let config = RpcConfig::new("host");
/// let services = LocalServices::new(&config);
///
/// let host = HostDispatcherBuilder::new(Arc::new(services))
///     .config(config)
///     .command("workbench.openFile", |ctx: CommandContext, path: String| async move {
///         Ok(format!("{} opened {path}", ctx.session))
///     })
///     .build();
/// assert_eq!(host.open_streams(), 0);
/// ```
pub struct HostDispatcherBuilder {
    // ---
    invoker: InvokerPtr,
    config: Option<RpcConfig>,
    commands: HashMap<String, CommandHandler>,
}

impl HostDispatcherBuilder {
    /// Create a builder around the capability that serves
    /// `request` / `stream-request` messages.
    pub fn new(invoker: InvokerPtr) -> Self {
        // ---
        Self {
            invoker,
            config: None,
            commands: HashMap::new(),
        }
    }

    /// Set the runtime configuration.
    ///
    /// Default: `RpcConfig::default()`.
    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a local command handler.
    ///
    /// `address` is matched verbatim against the `command` message's
    /// address. Registering the same address twice keeps the last handler.
    pub fn command<TReq, TResp, F, Fut>(mut self, address: impl Into<String>, handler: F) -> Self
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(CommandContext, TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.commands.insert(address.into(), wrap_command(handler));
        self
    }

    /// Build the dispatcher (consumes self).
    pub fn build(self) -> HostDispatcher {
        // ---
        HostDispatcher::new(
            self.invoker,
            self.commands,
            self.config.unwrap_or_default(),
        )
    }
}

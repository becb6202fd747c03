//! Unary and streaming RPC multiplexed over a single message channel.
//!
//! This library lets a sandboxed client context call remote procedures that
//! only a privileged host can reach. The two sides share nothing but a
//! channel that posts and receives opaque frames; every logical call is
//! tagged with a correlation ID so that many unary calls, bidirectional
//! streams and local commands can be in flight at once.
//!
//! - [`RpcClient`] issues `call`, `stream` and `command` invocations and
//!   routes replies through its [`Correlator`].
//! - [`HostDispatcher`] serves any number of client sessions, forwarding
//!   calls to a [`RemoteInvoker`] and commands to local handlers.
//! - [`MemoryChannel`] connects the two in-process.
//!

// Import all sub modules once...
mod client;
mod domain;
mod host;
mod protocol;

mod channel;

mod address;
mod correlation;
mod error;
mod host_builder;
mod macros;
mod rpc_config;
mod session;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{
    //
    Correlator,
    Disposition,
    EventKind,
    InboundHandler,
    RpcClient,
    StreamCall,
    StreamEvent,
    StreamState,
};
pub use host::{CommandContext, HostDispatcher, LocalServices, StreamIo};
pub use host_builder::HostDispatcherBuilder;

pub use rpc_config::RpcConfig;

pub use address::{set_first_letter_lowercase, MethodAddress};
pub use correlation::CorrelationId;
pub use error::{Result, RpcError};
pub use session::SessionId;

pub use protocol::{correlation_hint, Message, RemoteError};

pub use channel::{create_memory_channel_pair, MemoryChannel};

// --- public re-exports
pub use domain::{
    //
    CallEvent,
    CallSink,
    Channel,
    ChannelBase,
    ChannelPtr,
    Frame,
    InvokerPtr,
    ListenerHandle,
    RemoteInvoker,
    RemoteStream,
    Side,
};

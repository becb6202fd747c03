//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! channel implementations and of the concrete remote-procedure client.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod channel;
mod remote;

// --- Channel domain re-exports ---

pub use channel::{
    //
    Channel,
    ChannelBase,
    ChannelPtr,
    Frame,
    ListenerHandle,
    Side,
};

// --- Remote-procedure domain re-exports ---

pub use remote::{
    //
    CallEvent,
    CallSink,
    InvokerPtr,
    RemoteInvoker,
    RemoteStream,
};

/// Channel wire vocabulary.
///
/// This module defines the closed set of messages exchanged between the
/// client context and the host, and their JSON encoding on the channel.
mod message;

pub use message::{correlation_hint, Message, RemoteError};

//! Channel implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Channel` trait, exposed only through constructor functions and the
//! [`MemoryChannel`] namespace.
//!
//! Domain code must not depend on channel-specific types.

mod memory;

pub use memory::{create_memory_channel_pair, MemoryChannel};

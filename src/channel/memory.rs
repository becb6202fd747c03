//! In-memory channel implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Channel` trait. It is intended for testing, local execution, and as a
//! reference for channel semantics.
//!
//! ## Reference Semantics
//!
//! - Each direction is an ordered, bounded queue; `post()` waits while the
//!   queue is full.
//! - Frames posted before the peer's listener attaches are buffered.
//! - One listener per endpoint. The inbox is handed out once.
//! - `close()` drops the outbound queue; the peer's listener drains what is
//!   buffered and then ends.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::{
    // ---
    log_debug,
    Channel,
    ChannelBase,
    ChannelPtr,
    Frame,
    ListenerHandle,
    Result,
    RpcConfig,
    RpcError,
    Side,
};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// Both guarded fields are plain `Option`s that are only ever taken.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Namespace for in-memory channel constructors.
pub struct MemoryChannel;

impl MemoryChannel {
    /// Create two connected endpoints: `(host, client)`.
    pub fn pair(config: &RpcConfig) -> (ChannelPtr, ChannelPtr) {
        // ---
        let capacity = config.channel_capacity.max(1);
        let (to_client, client_inbox) = mpsc::channel(capacity);
        let (to_host, host_inbox) = mpsc::channel(capacity);

        let host = MemoryEndpoint::new(
            format!("{}/host", config.endpoint_id),
            Side::Host,
            to_client,
            host_inbox,
        );
        let client = MemoryEndpoint::new(
            format!("{}/client", config.endpoint_id),
            Side::Client,
            to_host,
            client_inbox,
        );

        log_debug!("{}: created memory channel pair", config.endpoint_id);

        (Arc::new(host), Arc::new(client))
    }

    /// Create a client endpoint with no host behind it.
    ///
    /// Everything posted comes straight back to the endpoint's own listener,
    /// which is what a client context observes when it runs outside its host.
    pub fn detached(config: &RpcConfig) -> ChannelPtr {
        // ---
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

        Arc::new(MemoryEndpoint::new(
            format!("{}/detached", config.endpoint_id),
            Side::Client,
            tx,
            rx,
        ))
    }
}

/// Create a connected `(host, client)` endpoint pair.
pub fn create_memory_channel_pair(config: &RpcConfig) -> (ChannelPtr, ChannelPtr) {
    MemoryChannel::pair(config)
}

struct MemoryEndpoint {
    // ---
    base: ChannelBase,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    inbox: Mutex<Option<mpsc::Receiver<Frame>>>,
}

impl MemoryEndpoint {
    fn new(
        endpoint_id: String,
        side: Side,
        outbound: mpsc::Sender<Frame>,
        inbox: mpsc::Receiver<Frame>,
    ) -> Self {
        Self {
            base: ChannelBase::new(endpoint_id, side),
            outbound: Mutex::new(Some(outbound)),
            inbox: Mutex::new(Some(inbox)),
        }
    }
}

#[async_trait::async_trait]
impl Channel for MemoryEndpoint {
    // ---
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    async fn post(&self, frame: Frame) -> Result<()> {
        // ---
        let sender = lock_ignore_poison(&self.outbound).clone();

        let sender =
            sender.ok_or_else(|| RpcError::ChannelClosed(self.endpoint_id().to_string()))?;

        sender
            .send(frame)
            .await
            .map_err(|_| RpcError::ChannelClosed(format!("{}: peer gone", self.endpoint_id())))
    }

    async fn subscribe(&self) -> Result<ListenerHandle> {
        // ---
        let inbox = lock_ignore_poison(&self.inbox).take();

        match inbox {
            Some(inbox) => {
                log_debug!("{}: listener attached", self.endpoint_id());
                Ok(ListenerHandle { inbox })
            }
            None => Err(RpcError::ListenerAlreadyAttached(
                self.endpoint_id().to_string(),
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing endpoint", self.endpoint_id());

        lock_ignore_poison(&self.outbound).take();
        Ok(())
    }
}

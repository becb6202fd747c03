use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use crate::protocol::{Message, RemoteError};
use crate::{log_debug, log_warn, ChannelPtr, CorrelationId, Result};

/// What a handler wants done with its registration after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep receiving messages for this correlation ID.
    Keep,
    /// The call reached a terminal state; drop the registration.
    Done,
}

/// Handler invoked with every inbound message for one correlation ID.
pub type InboundHandler = Box<dyn FnMut(Message) -> Disposition + Send>;

type SharedHandler = Arc<Mutex<InboundHandler>>;

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// A panicking handler leaves at worst one call unresolved; the table itself
/// has no invariant spanning more than one entry.
fn lock_ignore_poison<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Dispatch table routing inbound messages by correlation ID.
///
/// Handlers run on the channel's single receive loop, outside the table
/// lock, so a handler may register or deregister IDs (its own included)
/// while it runs.
#[derive(Default)]
pub struct Correlator {
    handlers: Mutex<HashMap<CorrelationId, SharedHandler>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under `id`.
    ///
    /// Returns `true` if an existing handler was replaced. IDs are unique per
    /// call, so a replacement means two calls share an ID and is logged.
    pub fn register(&self, id: CorrelationId, handler: InboundHandler) -> bool {
        // ---
        let previous = lock_ignore_poison(&self.handlers)
            .insert(id.clone(), Arc::new(Mutex::new(handler)));

        if previous.is_some() {
            log_warn!("handler for correlation_id {id} replaced; IDs must not be reused");
        }
        previous.is_some()
    }

    /// Remove the handler for `id`. Missing IDs are ignored.
    pub fn deregister(&self, id: &CorrelationId) -> bool {
        lock_ignore_poison(&self.handlers).remove(id).is_some()
    }

    pub fn is_registered(&self, id: &CorrelationId) -> bool {
        lock_ignore_poison(&self.handlers).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `message` to the handler registered for its correlation ID.
    ///
    /// Returns `false` when nothing is registered; such messages (late or
    /// duplicate terminal events) are dropped without error.
    pub fn route(&self, message: Message) -> bool {
        // ---
        let id = message.correlation_id().clone();

        let handler = lock_ignore_poison(&self.handlers).get(&id).cloned();

        let Some(handler) = handler else {
            log_debug!("dropping '{}' for unknown correlation_id: {id}", message.command());
            return false;
        };

        let disposition = {
            let mut handler = lock_ignore_poison(&handler);
            (*handler)(message)
        };

        if disposition == Disposition::Done {
            // Only drop the entry we ran; the handler may have been replaced
            // or removed while it executed.
            let mut handlers = lock_ignore_poison(&self.handlers);
            if handlers
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &handler))
            {
                handlers.remove(&id);
            }
        }
        true
    }

    /// Settle every registered call with a synthetic `error`.
    ///
    /// Used when the channel goes away so that nothing waits on replies that
    /// can no longer arrive. Returns how many calls were failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        // ---
        let ids: Vec<CorrelationId> = lock_ignore_poison(&self.handlers).keys().cloned().collect();

        for id in &ids {
            self.route(Message::Error {
                err: RemoteError::new(reason),
                correlation_id: id.clone(),
            });
        }

        // Handlers that chose to keep their entry are dropped regardless.
        lock_ignore_poison(&self.handlers).clear();
        ids.len()
    }

    /// Attach this correlator as the channel's one listener.
    ///
    /// The returned loop decodes every inbound frame and routes it. It ends
    /// when the channel closes or the correlator is dropped.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::ListenerAlreadyAttached` if the channel already
    /// has a listener.
    pub async fn attach(self: &Arc<Self>, channel: &ChannelPtr) -> Result<JoinHandle<()>> {
        // ---
        let mut listener = channel.subscribe().await?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let endpoint_id = channel.endpoint_id().to_string();

        Ok(tokio::spawn(async move {
            // ---
            while let Some(frame) = listener.inbox.recv().await {
                let Some(correlator) = weak.upgrade() else {
                    break;
                };

                match Message::decode(&frame) {
                    Ok(message) => {
                        correlator.route(message);
                    }
                    Err(_err) => {
                        log_warn!("{endpoint_id}: discarding inbound frame: {_err}");
                    }
                }
            }

            if let Some(correlator) = weak.upgrade() {
                let _failed = correlator.fail_all(&format!("channel {endpoint_id} closed"));
                log_debug!("{endpoint_id}: client receive loop stopped, {_failed} call(s) failed");
            }
        }))
    }
}

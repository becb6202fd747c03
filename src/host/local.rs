//! In-process service registry.
//!
//! [`LocalServices`] implements [`RemoteInvoker`] on top of async closures
//! registered by address. It stands in for a network client in tests and
//! demos, and documents what a real binding has to provide: a unary reply
//! per call, and for streams an ordered event queue plus a write/end sink.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::handler::BoxFuture;
use crate::{
    // ---
    log_debug,
    CallEvent,
    CallSink,
    MethodAddress,
    RemoteError,
    RemoteInvoker,
    RemoteStream,
    Result,
    RpcConfig,
};

type RemoteResult<T> = std::result::Result<T, RemoteError>;

trait UnaryFn: Send + Sync {
    fn call(&self, body: Value) -> BoxFuture<'static, RemoteResult<Value>>;
}

trait StreamFn: Send + Sync {
    fn call(&self, body: Value, io: StreamIo) -> BoxFuture<'static, RemoteResult<()>>;
}

struct TypedUnary<F, Fut, TReq, TResp> {
    func: F,
    _phantom: std::marker::PhantomData<fn(TReq, TResp, Fut)>,
}

impl<F, Fut, TReq, TResp> UnaryFn for TypedUnary<F, Fut, TReq, TResp>
where
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, body: Value) -> BoxFuture<'static, RemoteResult<Value>> {
        // ---
        let req: TReq = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(e) => {
                let err = RemoteError::new(format!("invalid request body: {e}"));
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.func)(req);

        Box::pin(async move {
            let resp = fut.await?;
            serde_json::to_value(resp)
                .map_err(|e| RemoteError::new(format!("invalid response body: {e}")))
        })
    }
}

struct ClosureStream<F>(F);

impl<F, Fut> StreamFn for ClosureStream<F>
where
    F: Fn(Value, StreamIo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult<()>> + Send + 'static,
{
    fn call(&self, body: Value, io: StreamIo) -> BoxFuture<'static, RemoteResult<()>> {
        Box::pin((self.0)(body, io))
    }
}

/// Both ends a stream handler works with.
pub struct StreamIo {
    writes: mpsc::Receiver<Value>,
    events: mpsc::Sender<CallEvent>,
}

impl StreamIo {
    /// Next client write; `None` once the client ended the stream.
    pub async fn recv(&mut self) -> Option<Value> {
        self.writes.recv().await
    }

    /// Send a `data` event.
    pub async fn send(&self, data: Value) -> RemoteResult<()> {
        self.emit(CallEvent::Data(data)).await
    }

    /// Send a `status` event.
    pub async fn status(&self, status: Value) -> RemoteResult<()> {
        self.emit(CallEvent::Status(status)).await
    }

    async fn emit(&self, event: CallEvent) -> RemoteResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| RemoteError::new("stream consumer went away"))
    }
}

/// Sink half of an in-process stream.
struct LocalSink {
    writes: Mutex<Option<mpsc::Sender<Value>>>,
}

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait::async_trait]
impl CallSink for LocalSink {
    async fn write(&self, body: Value) -> RemoteResult<()> {
        // ---
        let sender = lock_ignore_poison(&self.writes).clone();

        match sender {
            Some(sender) => sender
                .send(body)
                .await
                .map_err(|_| RemoteError::new("stream handler finished")),
            None => Err(RemoteError::new("write after end")),
        }
    }

    async fn end(&self) -> RemoteResult<()> {
        lock_ignore_poison(&self.writes).take();
        Ok(())
    }
}

/// Registry of in-process services addressed like remote ones.
///
/// Registration takes the address as written by callers
/// (`"thing.DeviceService.GetDevice"`); lookups use the resolved form, so
/// both spellings reach the same handler.
///
/// # Example
///
/// ```
/// use relay_rpc::{LocalServices, RpcConfig};
/// use serde_json::{json, Value};
///
/// let mut services = LocalServices::new(&RpcConfig::default());
/// services
///     .register_unary("thing.DeviceService.getDevice", |req: Value| async move {
///         Ok(json!({"code": 1, "device": req}))
///     })
///     .expect("well-formed address");
/// ```
pub struct LocalServices {
    unary: HashMap<String, Arc<dyn UnaryFn>>,
    streams: HashMap<String, Arc<dyn StreamFn>>,
    event_capacity: usize,
}

impl LocalServices {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            unary: HashMap::new(),
            streams: HashMap::new(),
            event_capacity: config.stream_event_capacity.max(1),
        }
    }

    /// Register a typed unary handler.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::AddressFormat` if `address` is malformed.
    pub fn register_unary<TReq, TResp, F, Fut>(&mut self, address: &str, handler: F) -> Result<()>
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<TResp>> + Send + 'static,
    {
        let key = MethodAddress::parse(address)?.resolved().to_string();
        self.unary.insert(
            key,
            Arc::new(TypedUnary {
                func: handler,
                _phantom: std::marker::PhantomData,
            }),
        );
        Ok(())
    }

    /// Register a streaming handler.
    ///
    /// The handler receives the initial body and a [`StreamIo`]. Returning
    /// `Ok(())` ends the stream; returning an error fails it.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::AddressFormat` if `address` is malformed.
    pub fn register_stream<F, Fut>(&mut self, address: &str, handler: F) -> Result<()>
    where
        F: Fn(Value, StreamIo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<()>> + Send + 'static,
    {
        let key = MethodAddress::parse(address)?.resolved().to_string();
        self.streams.insert(key, Arc::new(ClosureStream(handler)));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteInvoker for LocalServices {
    async fn unary(&self, method: &MethodAddress, body: Value) -> RemoteResult<Value> {
        // ---
        let key = method.resolved().to_string();
        let handler = self
            .unary
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("unimplemented method: {key}")))?;

        handler.call(body).await
    }

    async fn open_stream(&self, method: &MethodAddress, body: Value) -> RemoteResult<RemoteStream> {
        // ---
        let key = method.resolved().to_string();
        let handler = self
            .streams
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("unimplemented method: {key}")))?;

        let (events_tx, events_rx) = mpsc::channel(self.event_capacity);
        let (writes_tx, writes_rx) = mpsc::channel(self.event_capacity);

        let io = StreamIo {
            writes: writes_rx,
            events: events_tx.clone(),
        };

        tokio::spawn(async move {
            let terminal = match handler.call(body, io).await {
                Ok(()) => CallEvent::End,
                Err(err) => CallEvent::Error(err),
            };
            // The relay may already be gone after a session teardown.
            if events_tx.send(terminal).await.is_err() {
                log_debug!("stream {key}: terminal event dropped, consumer gone");
            }
        });

        Ok(RemoteStream {
            events: events_rx,
            sink: Arc::new(LocalSink {
                writes: Mutex::new(Some(writes_tx)),
            }),
        })
    }
}

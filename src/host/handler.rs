use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{CorrelationId, Result, SessionId};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a command handler learns about the invocation besides its body.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Session the command came from.
    pub session: SessionId,
    pub correlation_id: CorrelationId,
    pub address: String,
}

/// Type-erased async command handler.
///
/// Takes the raw JSON body and returns the JSON value relayed back in the
/// `callback` message.
pub(crate) trait CommandFn: Send + Sync {
    fn call(&self, ctx: CommandContext, body: Value) -> BoxFuture<'static, Result<Value>>;
}

pub(crate) type CommandHandler = Arc<dyn CommandFn>;

struct TypedCommand<F, Fut, TReq, TResp> {
    func: F,
    _phantom: std::marker::PhantomData<fn(TReq, TResp, Fut)>,
}

impl<F, Fut, TReq, TResp> CommandFn for TypedCommand<F, Fut, TReq, TResp>
where
    F: Fn(CommandContext, TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, ctx: CommandContext, body: Value) -> BoxFuture<'static, Result<Value>> {
        // ---
        let req: TReq = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let fut = (self.func)(ctx, req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(serde_json::to_value(resp)?)
        })
    }
}

/// Wrap a typed command closure into a type-erased handler.
pub(crate) fn wrap_command<F, Fut, TReq, TResp>(func: F) -> CommandHandler
where
    F: Fn(CommandContext, TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    Arc::new(TypedCommand {
        func,
        _phantom: std::marker::PhantomData,
    })
}

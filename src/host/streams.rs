use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::{CallSink, CorrelationId, Result, RpcError, SessionId};

/// One open remote stream, owned by the session that requested it.
pub(crate) struct OpenStream {
    pub session: SessionId,
    pub sink: Arc<dyn CallSink>,
    /// Task relaying the remote call's events back over the channel.
    pub relay: Option<JoinHandle<()>>,
}

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Host-side table of open streams keyed by correlation ID.
#[derive(Default)]
pub(crate) struct StreamTable {
    streams: Mutex<HashMap<CorrelationId, OpenStream>>,
}

impl StreamTable {
    pub fn contains(&self, id: &CorrelationId) -> bool {
        lock_ignore_poison(&self.streams).contains_key(id)
    }

    /// Store `stream` under `id`.
    ///
    /// A live entry is never replaced; the rejected stream is handed back so
    /// the caller can end it.
    pub fn insert(
        &self,
        id: CorrelationId,
        stream: OpenStream,
    ) -> std::result::Result<(), OpenStream> {
        // ---
        let mut streams = lock_ignore_poison(&self.streams);

        if streams.contains_key(&id) {
            return Err(stream);
        }
        streams.insert(id, stream);
        Ok(())
    }

    /// Record the relay task once it has been spawned.
    ///
    /// If the entry is already gone (the call finished instantly) or now
    /// belongs to another stream, the task is left to run to completion.
    pub fn set_relay(&self, id: &CorrelationId, sink: &Arc<dyn CallSink>, relay: JoinHandle<()>) {
        let mut streams = lock_ignore_poison(&self.streams);

        if let Some(stream) = streams.get_mut(id).filter(|s| Arc::ptr_eq(&s.sink, sink)) {
            stream.relay = Some(relay);
        }
    }

    /// Sink of the stream `id`, provided it belongs to `session`.
    pub fn sink(&self, session: &SessionId, id: &CorrelationId) -> Result<Arc<dyn CallSink>> {
        lock_ignore_poison(&self.streams)
            .get(id)
            .filter(|stream| &stream.session == session)
            .map(|stream| stream.sink.clone())
            .ok_or_else(|| RpcError::UnknownCorrelation(id.clone()))
    }

    /// Remove the stream `id`, provided it belongs to `session`.
    pub fn take(&self, session: &SessionId, id: &CorrelationId) -> Result<OpenStream> {
        let mut streams = lock_ignore_poison(&self.streams);

        match streams.get(id) {
            Some(stream) if &stream.session == session => {
                streams.remove(id).ok_or_else(|| RpcError::UnknownCorrelation(id.clone()))
            }
            _ => Err(RpcError::UnknownCorrelation(id.clone())),
        }
    }

    /// Remove `id` if its entry still holds `sink`.
    ///
    /// Used by relay tasks, which must not remove a later stream that reuses
    /// the identifier.
    pub fn remove_own(&self, id: &CorrelationId, sink: &Arc<dyn CallSink>) -> Option<OpenStream> {
        // ---
        let mut streams = lock_ignore_poison(&self.streams);

        match streams.get(id) {
            Some(stream) if Arc::ptr_eq(&stream.sink, sink) => streams.remove(id),
            _ => None,
        }
    }

    /// Remove and return every stream owned by `session`.
    pub fn drain_session(&self, session: &SessionId) -> Vec<(CorrelationId, OpenStream)> {
        // ---
        let mut streams = lock_ignore_poison(&self.streams);

        let ids: Vec<CorrelationId> = streams
            .iter()
            .filter(|(_, stream)| &stream.session == session)
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| streams.remove(&id).map(|stream| (id, stream)))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.streams).len()
    }

    pub fn count_for(&self, session: &SessionId) -> usize {
        lock_ignore_poison(&self.streams)
            .values()
            .filter(|stream| &stream.session == session)
            .count()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::RemoteError;
    use serde_json::Value;

    struct NullSink;

    #[async_trait::async_trait]
    impl CallSink for NullSink {
        async fn write(&self, _body: Value) -> std::result::Result<(), RemoteError> {
            Ok(())
        }

        async fn end(&self) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
    }

    fn open(session: &SessionId) -> (OpenStream, Arc<dyn CallSink>) {
        let sink: Arc<dyn CallSink> = Arc::new(NullSink);
        let stream = OpenStream {
            session: session.clone(),
            sink: sink.clone(),
            relay: None,
        };
        (stream, sink)
    }

    #[test]
    fn test_live_id_is_not_replaced() {
        // ---
        let table = StreamTable::default();
        let first = SessionId::generate("first");
        let second = SessionId::generate("second");
        let id = CorrelationId::from("dup");

        let (stream, _) = open(&first);
        assert!(table.insert(id.clone(), stream).is_ok());

        let (stream, _) = open(&second);
        let rejected = table.insert(id.clone(), stream);
        assert!(matches!(rejected, Err(ref s) if s.session == second));

        assert_eq!(table.count_for(&first), 1);
        assert_eq!(table.count_for(&second), 0);
    }

    #[test]
    fn test_remove_own_ignores_newer_entry() {
        // ---
        let table = StreamTable::default();
        let session = SessionId::generate("panel");
        let id = CorrelationId::from("reused");

        let (stream, old_sink) = open(&session);
        table.insert(id.clone(), stream).ok();
        assert!(table.remove_own(&id, &old_sink).is_some());

        let (stream, new_sink) = open(&session);
        table.insert(id.clone(), stream).ok();

        assert!(table.remove_own(&id, &old_sink).is_none());
        assert_eq!(table.len(), 1);
        assert!(table.remove_own(&id, &new_sink).is_some());
        assert_eq!(table.len(), 0);
    }
}

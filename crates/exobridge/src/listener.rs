//! # Listener Registry
//!
//! Maps a channel name to the one listener that answers it. Dispatch always
//! picks "the" listener; registering again replaces it.
//!
//! Listeners come in two flavours. A sync listener runs to completion inside
//! `dispatch`, so two messages dispatched in order are handled in order. An
//! async listener is called inside `dispatch` too, but its future is driven
//! elsewhere and may interleave with later messages.
//!
//! A panicking listener is reported as an `Err` from its future, so a bad
//! listener can never take the dispatching pump down with it.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

/// The eventual result of a listener.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

type SyncFn = dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync;

#[derive(Clone)]
pub enum Listener {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Listener {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// Calls the listener. Sync listeners have already run when this returns.
    pub fn invoke(&self, args: Vec<Value>) -> HandlerFuture {
        match self {
            Self::Sync(f) => {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| f(args)))
                    .unwrap_or_else(|payload| Err(panic_error(payload)));
                futures::future::ready(result).boxed()
            }
            Self::Async(f) => match std::panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .map(|outcome| outcome.unwrap_or_else(|payload| Err(panic_error(payload))))
                    .boxed(),
                Err(payload) => futures::future::ready(Err(panic_error(payload))).boxed(),
            },
        }
    }
}

/// Polls a listener future once in place and hands whatever is left to the
/// runtime. `finish` sees the result either way.
///
/// The in-place poll keeps the synchronous prefix of every listener in
/// dispatch order; only work after its first suspension point can interleave.
pub(crate) fn drive<F>(mut fut: HandlerFuture, finish: F)
where
    F: FnOnce(anyhow::Result<Value>) + Send + 'static,
{
    match (&mut fut).now_or_never() {
        Some(result) => finish(result),
        None => {
            tokio::spawn(async move { finish(fut.await) });
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("listener panicked: {}", message)
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `listener` for `channel`, replacing any previous one.
    pub fn register(&self, channel: impl Into<String>, listener: Listener) {
        let channel = channel.into();
        if self.listeners.insert(channel.clone(), listener).is_some() {
            tracing::debug!(%channel, "replaced existing listener");
        }
    }

    /// Invokes the listener for `channel`, or returns `None` if there is none.
    pub fn dispatch(&self, channel: &str, args: Vec<Value>) -> Option<HandlerFuture> {
        // clone out so the shard lock is released before the listener runs
        let listener = self.listeners.get(channel).map(|entry| entry.value().clone())?;
        Some(listener.invoke(args))
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.listeners.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_dispatch_without_listener() {
        let registry = ListenerRegistry::new();
        assert!(registry.dispatch("nobody", vec![]).is_none());
    }

    #[tokio::test]
    async fn test_sync_listener_runs_inside_dispatch() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.register("log", Listener::sync(move |args| {
            sink.lock().unwrap().push(args);
            Ok(Value::Null)
        }));

        let fut = registry.dispatch("log", vec![json!("a")]).unwrap();
        // already ran, before the future is polled
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!("a")]]);
        assert_eq!(fut.await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_async_listener_result() {
        let registry = ListenerRegistry::new();
        registry.register("add", Listener::from_async(|args: Vec<Value>| async move {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(json!(sum))
        }));

        let fut = registry.dispatch("add", vec![json!(2), json!(3)]).unwrap();
        assert_eq!(fut.await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_register_replaces() {
        let registry = ListenerRegistry::new();
        registry.register("who", Listener::sync(|_| Ok(json!("first"))));
        registry.register("who", Listener::sync(|_| Ok(json!("second"))));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.dispatch("who", vec![]).unwrap().await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_listener_may_register_while_dispatched() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = registry.clone();
        registry.register("install", Listener::sync(move |_| {
            inner.register("installed", Listener::sync(|_| Ok(json!(true))));
            Ok(Value::Null)
        }));

        registry.dispatch("install", vec![]).unwrap().await.unwrap();
        assert!(registry.contains("installed"));
    }

    #[tokio::test]
    async fn test_sync_panic_becomes_error() {
        let registry = ListenerRegistry::new();
        registry.register("boom", Listener::sync(|_| panic!("kaboom")));

        let err = registry.dispatch("boom", vec![]).unwrap().await.unwrap_err();
        assert!(err.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_async_panic_becomes_error() {
        let registry = ListenerRegistry::new();
        registry.register("boom", Listener::from_async(|args: Vec<Value>| async move {
            tokio::task::yield_now().await;
            if args.is_empty() {
                panic!("late kaboom");
            }
            Ok(Value::Null)
        }));

        let err = registry.dispatch("boom", vec![]).unwrap().await.unwrap_err();
        assert!(err.to_string().contains("late kaboom"));
    }
}

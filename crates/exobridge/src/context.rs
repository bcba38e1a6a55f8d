//! # Context Dispatch
//!
//! Blocking calls that name a function instead of a channel. On the wire they
//! are `["@@request-sync-context", args, id, true, function]`; on the host they
//! reach a single context handler.
//!
//! Rather than matching on function-name strings, a host describes the
//! operations it supports as an adjacently tagged enum and lets
//! [`ContextCall::decode`] pick the variant:
//!
//! ```ignore
//! #[derive(serde::Deserialize)]
//! #[serde(tag = "function", content = "args", rename_all = "camelCase")]
//! enum HostOp {
//!     GetConfig((String,)),
//!     SetConfig(String, serde_json::Value),
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::listener::HandlerFuture;

/// A decoded context request.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextCall {
    pub function: String,
    pub args: Vec<Value>,
}

impl ContextCall {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self { function: function.into(), args }
    }

    /// Decodes the call as one variant of an operation enum tagged by
    /// `function` with its positional `args` as content.
    pub fn decode<K: DeserializeOwned>(&self) -> serde_json::Result<K> {
        let tagged = serde_json::json!({
            "function": self.function,
            "args": self.args,
        });
        serde_json::from_value(tagged)
    }
}

pub(crate) type ContextHandler = Arc<dyn Fn(ContextCall) -> HandlerFuture + Send + Sync>;

pub(crate) fn handler<F, Fut>(f: F) -> ContextHandler
where
    F: Fn(ContextCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |call| f(call).boxed())
}

/// Wraps a handler over a typed operation enum. Calls naming an unknown
/// operation, or carrying the wrong arguments, fail to decode and are reported
/// as listener errors.
pub(crate) fn typed_handler<K, F, Fut>(f: F) -> ContextHandler
where
    K: DeserializeOwned + Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |call: ContextCall| {
        let f = f.clone();
        async move {
            let op = call.decode::<K>().map_err(|e| {
                anyhow::anyhow!("unsupported context call '{}': {}", call.function, e)
            })?;
            f(op).await
        }
        .boxed()
    })
}

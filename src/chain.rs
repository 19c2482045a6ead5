use std::{fmt, future::IntoFuture, sync::Arc, time::Duration};

use futures_util::{future::BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Event, EventPayload, LoadingHandle, Network, NetworkError, RequestContext, Response, Result,
};

/// Key under which [`ResponseChain::merge`] stores the chain's own result.
pub const ORIGINAL_KEY: &str = "original";

/// Accumulated result of one or more [`ResponseChain::merge`] calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Merged(Map<String, Value>);

impl Merged {
    /// The chain's own result, captured by the first merge.
    pub fn original(&self) -> Option<&Value> {
        self.0.get(ORIGINAL_KEY)
    }

    /// Result stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// All merged results keyed by name.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// All merged results as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Composable wrapper around the eventual result of a logical request.
///
/// Every combinator consumes the chain and returns a new one wrapping the
/// continuation. The chain is a future: `.await` it to drive the request.
pub struct ResponseChain<T> {
    network: Network,
    context: Arc<RequestContext>,
    future: BoxFuture<'static, Result<T>>,
    merging: bool,
}

impl<T> fmt::Debug for ResponseChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseChain")
            .field("context", &self.context)
            .field("merging", &self.merging)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ResponseChain<T> {
    pub(crate) fn new(
        network: Network,
        context: Arc<RequestContext>,
        future: BoxFuture<'static, Result<T>>,
    ) -> Self {
        Self {
            network,
            context,
            future,
            merging: false,
        }
    }

    /// The logical request this chain was created for.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    fn map_future<U, F>(self, merging: bool, continuation: F) -> ResponseChain<U>
    where
        F: FnOnce(BoxFuture<'static, Result<T>>) -> BoxFuture<'static, Result<U>>,
    {
        ResponseChain {
            network: self.network,
            context: self.context,
            future: continuation(self.future),
            merging,
        }
    }

    /// Maps a successful value. A rejection is published on [`Event::Error`]
    /// and then propagated, so one global handler observes every rejection no
    /// call site handles locally.
    pub fn then<U, F>(self, on_success: F) -> ResponseChain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let emitter = self.network.clone();
        self.map_future(false, |future| {
            async move {
                match future.await {
                    Ok(value) => on_success(value),
                    Err(err) => {
                        emitter.emit(Event::Error, &EventPayload::Error(&err));
                        Err(err)
                    }
                }
            }
            .boxed()
        })
    }

    /// Maps a successful value and handles a rejection locally.
    pub fn then_or_else<U, F, G>(self, on_success: F, on_error: G) -> ResponseChain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
        G: FnOnce(NetworkError) -> Result<U> + Send + 'static,
    {
        self.map_future(false, |future| {
            async move {
                match future.await {
                    Ok(value) => on_success(value),
                    Err(err) => on_error(err),
                }
            }
            .boxed()
        })
    }

    /// Handles a rejection, possibly recovering with a value.
    pub fn catch<F>(self, handler: F) -> Self
    where
        F: FnOnce(NetworkError) -> Result<T> + Send + 'static,
    {
        let merging = self.merging;
        self.map_future(merging, |future| {
            async move {
                match future.await {
                    Ok(value) => Ok(value),
                    Err(err) => handler(err),
                }
            }
            .boxed()
        })
    }

    /// Runs `callback` once the chain settles, on both paths. The settled
    /// value passes through unchanged.
    pub fn complete<F>(self, callback: F) -> Self
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        let merging = self.merging;
        self.map_future(merging, |future| {
            async move {
                let result = future.await;
                callback(&result);
                result
            }
            .boxed()
        })
    }

    /// Shows the configured loading indicator for at least one second.
    pub fn show_loading(self, message: impl AsRef<str>) -> Self {
        self.show_loading_for(message, Duration::from_secs(1))
    }

    /// Shows the configured loading indicator until the chain settles.
    ///
    /// The indicator is dismissed exactly once, also when the chain is dropped
    /// without being awaited. Without a configured factory this is a no-op.
    pub fn show_loading_for(self, message: impl AsRef<str>, duration: Duration) -> Self {
        let Some(factory) = self.network.options().loading.clone() else {
            return self;
        };
        let guard = LoadingGuard(factory(message.as_ref(), duration));
        self.complete(move |_| drop(guard))
    }

    /// Enables retries for every attempt of this logical request.
    pub fn enable_retry(self, max_retries: u32) -> Self {
        self.context.enable_retry(max_retries, None);
        self
    }

    /// Enables retries and also retries HTTP-successful responses for which
    /// `predicate` returns `true`.
    pub fn enable_retry_when<P>(self, max_retries: u32, predicate: P) -> Self
    where
        P: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.context
            .enable_retry(max_retries, Some(Arc::new(predicate)));
        self
    }

    /// Combines this chain's result with another independently created
    /// future.
    ///
    /// The first merge stores this chain's result under [`ORIGINAL_KEY`]; every
    /// merge stores `other`'s result under `name`. Results are awaited in call
    /// order. `name` must not be [`ORIGINAL_KEY`]; that is reported before
    /// anything is awaited.
    pub fn merge<V, O>(self, other: O, name: impl Into<String>) -> Result<ResponseChain<Merged>>
    where
        T: Serialize,
        V: Serialize + Send + 'static,
        O: IntoFuture<Output = Result<V>>,
        O::IntoFuture: Send + 'static,
    {
        let name = name.into();
        if name == ORIGINAL_KEY {
            return Err(NetworkError::Usage(format!(
                "'{ORIGINAL_KEY}' is reserved and cannot be used as a merge key"
            )));
        }

        let merging = self.merging;
        let other = other.into_future();
        Ok(self.map_future(true, |future| {
            async move {
                let base = to_json(future.await?)?;
                let mut merged = if merging {
                    match base {
                        Value::Object(fields) => Merged(fields),
                        _ => {
                            return Err(NetworkError::Decode(
                                "merge accumulator is not an object".to_owned(),
                            ))
                        }
                    }
                } else {
                    let mut fields = Map::new();
                    fields.insert(ORIGINAL_KEY.to_owned(), base);
                    Merged(fields)
                };
                let extra = to_json(other.await?)?;
                merged.0.insert(name, extra);
                Ok::<_, NetworkError>(merged)
            }
            .boxed()
        }))
    }
}

impl ResponseChain<Response> {
    /// Decodes the response body as JSON.
    pub fn json(self) -> ResponseChain<Value> {
        self.json_as()
    }

    /// Decodes the response body as JSON into `D`.
    pub fn json_as<D>(self) -> ResponseChain<D>
    where
        D: DeserializeOwned + Send + 'static,
    {
        self.map_future(false, |future| async move { future.await?.json::<D>() }.boxed())
    }
}

impl<T: Send + 'static> IntoFuture for ResponseChain<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

/// Dismisses a loading indicator when dropped.
struct LoadingGuard(Option<LoadingHandle>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.finish();
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| NetworkError::Decode(format!("merge value is not serializable: {err}")))
}

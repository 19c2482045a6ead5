use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use futures_util::FutureExt;

use crate::{
    context::{RetryState, Verdict},
    prepare, Event, EventHub, EventPayload, GlobalOptions, Headers, Method,
    NetworkError, Payload, RequestContext, ResponseChain, ReqwestTransport, Response, Result,
    SubscriptionId, Transport,
};

struct Shared {
    transport: Arc<dyn Transport>,
    options: RwLock<Arc<GlobalOptions>>,
    events: EventHub,
}

/// Request dispatcher with global options, lifecycle events and opt-in retry.
///
/// Cloning is cheap; clones share options, event handlers and transport.
#[derive(Clone)]
pub struct Network {
    shared: Arc<Shared>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("options", &self.options())
            .field("events", &self.shared.events)
            .finish()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new(ReqwestTransport::new())
    }
}

impl Network {
    /// Creates a dispatcher over the given host request primitive.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                options: RwLock::new(Arc::new(GlobalOptions::default())),
                events: EventHub::new(),
            }),
        }
    }

    /// Creates a `reqwest`-backed dispatcher configured from environment
    /// variables. See [`GlobalOptions::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        Ok(Self::default().with_options(GlobalOptions::from_env()?))
    }

    /// Applies global options.
    pub fn with_options(self, options: GlobalOptions) -> Self {
        self.config(options);
        self
    }

    /// Replaces the global options wholesale. Requests already dispatched keep
    /// the options they started with.
    pub fn config(&self, options: GlobalOptions) -> &Self {
        *self
            .shared
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(options);
        self
    }

    /// Current global options.
    pub fn options(&self) -> Arc<GlobalOptions> {
        Arc::clone(
            &self
                .shared
                .options
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Registers a global event handler.
    pub fn on<F>(&self, event: Event, handler: F) -> &Self
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.shared.events.on(event, handler);
        self
    }

    /// Registers a global event handler, returning an id for [`Network::off`].
    pub fn subscribe<F>(&self, event: Event, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.shared.events.on(event, handler)
    }

    /// Removes a handler registered with [`Network::subscribe`]. Returns
    /// `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.shared.events.off(id)
    }

    /// The event hub shared by every clone of this dispatcher.
    pub fn events(&self) -> &EventHub {
        &self.shared.events
    }

    /// Starts a logical `GET` request. See [`Network::request`].
    pub fn get<D, H>(&self, uri: impl Into<String>, data: D, headers: H) -> ResponseChain<Response>
    where
        D: Into<Payload>,
        H: Into<Headers>,
    {
        self.request(uri, data, Method::Get, headers)
    }

    /// Starts a logical `POST` request. See [`Network::request`].
    pub fn post<D, H>(&self, uri: impl Into<String>, data: D, headers: H) -> ResponseChain<Response>
    where
        D: Into<Payload>,
        H: Into<Headers>,
    {
        self.request(uri, data, Method::Post, headers)
    }

    /// Starts a logical request.
    ///
    /// Nothing is sent until the returned chain is awaited; retry settings
    /// applied to the chain before that cover every attempt.
    pub fn request<D, H>(
        &self,
        uri: impl Into<String>,
        data: D,
        method: Method,
        headers: H,
    ) -> ResponseChain<Response>
    where
        D: Into<Payload>,
        H: Into<Headers>,
    {
        let context = Arc::new(RequestContext::new(
            uri,
            method,
            data.into(),
            headers.into(),
        ));
        let future = self.clone().dispatch(Arc::clone(&context)).boxed();
        ResponseChain::new(self.clone(), context, future)
    }

    pub(crate) fn emit(&self, event: Event, payload: &EventPayload<'_>) {
        self.shared.events.emit(event, payload);
    }

    async fn dispatch(self, context: Arc<RequestContext>) -> Result<Response> {
        let options = self.options();
        let policy = context.retry_policy();
        let outgoing = prepare::build_outgoing(&context, &options);

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %outgoing.method, url = %outgoing.url, "dispatching request");

        self.emit(Event::Start, &EventPayload::Request(&context));

        let mut state = RetryState::new(&policy);
        loop {
            let outcome = self.shared.transport.send(outgoing.clone()).await;
            let attempt = state.attempt();
            self.emit(
                Event::End,
                &EventPayload::Attempt {
                    context: &context,
                    attempt,
                },
            );

            let err = match outcome {
                Ok(response) => {
                    let verdict = if response.is_success() {
                        policy.judge(&response)
                    } else {
                        Verdict::Retry
                    };
                    self.emit(Event::Response, &EventPayload::Response(&response));
                    match verdict {
                        Verdict::Accept => return Ok(response),
                        Verdict::Retry => {
                            if let Some(next) = state.next() {
                                self.wait_before_retry(attempt, &options).await;
                                state = next;
                                continue;
                            }
                        }
                        Verdict::Abandon => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(url = %outgoing.url, "retry predicate panicked, not retrying");
                        }
                    }
                    NetworkError::http(response)
                }
                Err(failure) => {
                    if let Some(next) = state.next() {
                        self.wait_before_retry(attempt, &options).await;
                        state = next;
                        continue;
                    }
                    NetworkError::Transport(failure)
                }
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(url = %outgoing.url, attempts = attempt + 1, error = %err, "request failed");

            self.emit(Event::Error, &EventPayload::Error(&err));
            return Err(err);
        }
    }

    /// Waits before the next retry attempt.
    ///
    /// Exponential backoff from `retry_backoff_ms`; no wait at all when it is
    /// zero.
    async fn wait_before_retry(&self, attempt: u32, options: &GlobalOptions) {
        let exp = attempt.min(16);
        let multiplier = 1u64 << exp;
        let delay_ms = options.retry_backoff_ms.saturating_mul(multiplier);

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request after {} ms (attempt {})", delay_ms, attempt + 1);

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

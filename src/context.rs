use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{Headers, Method, Payload, Response};

/// Decides whether an HTTP-successful response should still be retried.
pub type RetryPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// Retry configuration of one logical request.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries happen only when explicitly enabled.
    pub enabled: bool,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    predicate: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            predicate: Arc::new(|_| false),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("enabled", &self.enabled)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// What the retry predicate made of an HTTP-successful response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accept,
    Retry,
    /// The predicate panicked: settle as failed without retrying.
    Abandon,
}

impl RetryPolicy {
    /// Whether `response` is flagged for retry by the predicate. A panicking
    /// predicate flags the response.
    pub fn flags(&self, response: &Response) -> bool {
        self.judge(response) != Verdict::Accept
    }

    pub(crate) fn judge(&self, response: &Response) -> Verdict {
        if !self.enabled {
            return Verdict::Accept;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(response))) {
            Ok(false) => Verdict::Accept,
            Ok(true) => Verdict::Retry,
            Err(_) => Verdict::Abandon,
        }
    }
}

/// Invariants of one logical request, shared by every attempt.
pub struct RequestContext {
    uri: String,
    method: Method,
    data: Payload,
    headers: Headers,
    retry: Mutex<RetryPolicy>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("uri", &self.uri)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("retry", &self.retry_policy())
            .finish()
    }
}

impl RequestContext {
    /// Creates the context of a logical request with retries disabled.
    pub fn new(uri: impl Into<String>, method: Method, data: Payload, headers: Headers) -> Self {
        Self {
            uri: uri.into(),
            method,
            data,
            headers,
            retry: Mutex::new(RetryPolicy::default()),
        }
    }

    /// Target URI as given by the caller, before the base URI is applied.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// HTTP method of every attempt.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Caller payload, before default data is merged in.
    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Caller headers, before defaults are applied.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Snapshot of the current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn enable_retry(&self, max_retries: u32, predicate: Option<RetryPredicate>) {
        let mut policy = self.retry.lock().unwrap_or_else(PoisonError::into_inner);
        policy.enabled = true;
        policy.max_retries = max_retries;
        if let Some(predicate) = predicate {
            policy.predicate = predicate;
        }
    }
}

/// Position of a logical request in its retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RetryState {
    attempt: u32,
    budget: u32,
}

impl RetryState {
    pub(crate) fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            budget: if policy.enabled { policy.max_retries } else { 0 },
        }
    }

    pub(crate) fn attempt(self) -> u32 {
        self.attempt
    }

    /// The state of the next attempt, or `None` once the budget is spent.
    pub(crate) fn next(self) -> Option<Self> {
        (self.attempt < self.budget).then_some(Self {
            attempt: self.attempt + 1,
            budget: self.budget,
        })
    }
}

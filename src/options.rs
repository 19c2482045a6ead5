use std::{fmt, sync::Arc, time::Duration};

use serde_json::{Map, Value};

/// Content type sent when none is configured.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
/// Header carrying the source identifier of every request.
pub const SOURCE_HEADER: &str = "x-request-source";
/// Source identifier sent when none is configured.
pub const DEFAULT_SOURCE: &str = "netchain";

/// Factory for a loading indicator: receives the message and how long the
/// indicator should stay up at minimum, returns a token dismissing it.
pub type LoadingFactory = Arc<dyn Fn(&str, Duration) -> Option<LoadingHandle> + Send + Sync>;

/// Completion token returned by a [`LoadingFactory`].
pub struct LoadingHandle(Box<dyn FnOnce() + Send>);

impl LoadingHandle {
    /// Wraps the callback that dismisses the indicator.
    pub fn new(dismiss: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(dismiss))
    }

    /// Dismisses the indicator.
    pub fn finish(self) {
        (self.0)()
    }
}

impl fmt::Debug for LoadingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoadingHandle")
    }
}

/// Process-wide options read by every dispatch.
#[derive(Clone, Default)]
pub struct GlobalOptions {
    /// Prefix applied to relative request URIs.
    pub base_uri: Option<String>,
    /// Content type of every request unless overridden per request.
    pub default_content_type: Option<String>,
    /// Default fields merged under every object payload.
    pub data: Option<Map<String, Value>>,
    /// Loading indicator used by `show_loading`.
    pub loading: Option<LoadingFactory>,
    /// Value of the source identifier header.
    pub source: Option<String>,
    /// Base delay between retry attempts in milliseconds (exponential
    /// strategy). Zero retries immediately.
    pub retry_backoff_ms: u64,
}

impl fmt::Debug for GlobalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalOptions")
            .field("base_uri", &self.base_uri)
            .field("default_content_type", &self.default_content_type)
            .field("data", &self.data)
            .field("loading", &self.loading.as_ref().map(|_| "<factory>"))
            .field("source", &self.source)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl GlobalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = Some(content_type.into());
        self
    }

    /// Sets the default data. Non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    /// Sets the loading indicator factory used by `show_loading`.
    pub fn with_loading<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, Duration) -> Option<LoadingHandle> + Send + Sync + 'static,
    {
        self.loading = Some(Arc::new(factory));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    /// Effective default content type.
    pub fn content_type(&self) -> &str {
        self.default_content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Effective source identifier.
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE)
    }

    /// Reads options from environment variables.
    ///
    /// Reads (all optional):
    /// - `NETCHAIN_BASE_URI`: prefix for relative URIs
    /// - `NETCHAIN_CONTENT_TYPE`: default content type
    /// - `NETCHAIN_SOURCE`: source identifier header value
    /// - `NETCHAIN_RETRY_BACKOFF_MS`: retry backoff base in milliseconds
    ///
    /// Returns an error if a variable is set but empty or malformed.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> std::result::Result<Self, String> {
        let non_empty = |key: &str| -> std::result::Result<Option<String>, String> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(format!("{key} is set but empty")),
                Some(value) => Ok(Some(value.trim().to_owned())),
                None => Ok(None),
            }
        };

        let retry_backoff_ms = non_empty("NETCHAIN_RETRY_BACKOFF_MS")?
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|err| format!("invalid NETCHAIN_RETRY_BACKOFF_MS '{value}': {err}"))
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            base_uri: non_empty("NETCHAIN_BASE_URI")?,
            default_content_type: non_empty("NETCHAIN_CONTENT_TYPE")?,
            data: None,
            loading: None,
            source: non_empty("NETCHAIN_SOURCE")?,
            retry_backoff_ms,
        })
    }
}

use std::{collections::BTreeMap, fmt, time::Duration};

use futures_util::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{Headers, Method, Payload, Response, TransportFailure};

/// One attempt's worth of request data, handed to a [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingRequest {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Payload,
}

/// The host request primitive.
///
/// Each call to [`Transport::send`] is one attempt and must settle exactly
/// once: with a [`Response`] carrying a status code, or with a failure when no
/// status is available.
pub trait Transport: Send + Sync {
    fn send(&self, request: OutgoingRequest) -> BoxFuture<'static, Result<Response, TransportFailure>>;
}

impl<F> Transport for F
where
    F: Fn(OutgoingRequest) -> BoxFuture<'static, Result<Response, TransportFailure>> + Send + Sync,
{
    fn send(&self, request: OutgoingRequest) -> BoxFuture<'static, Result<Response, TransportFailure>> {
        self(request)
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout_ms: Option<u64>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, TLS roots, pools).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout_ms: None,
        }
    }

    /// Per-attempt timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn build(&self, request: OutgoingRequest) -> Result<reqwest::RequestBuilder, TransportFailure> {
        let mut builder = self.http.request(to_reqwest_method(request.method), &request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        builder = match request.body {
            Payload::Empty => builder,
            Payload::Json(Value::Object(fields)) if request.method.uses_query() => {
                let pairs: Vec<(String, String)> = fields
                    .into_iter()
                    .map(|(key, value)| (key, query_value(value)))
                    .collect();
                builder.query(&pairs)
            }
            Payload::Json(value) => builder.body(serde_json::to_vec(&value)?),
            Payload::Text(text) => builder.body(text),
            Payload::Binary(bytes) => builder.body(bytes),
        };
        Ok(builder)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: OutgoingRequest) -> BoxFuture<'static, Result<Response, TransportFailure>> {
        let builder = self.build(request);
        async move {
            let response = builder?.send().await?;
            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect();
            let body = response.text().await?;
            Ok(Response {
                status,
                headers,
                body,
            })
        }
        .boxed()
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn query_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

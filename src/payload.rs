use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{NetworkError, Result};

/// HTTP method of a logical request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Methods whose object payloads travel in the query string.
    pub fn uses_query(self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = NetworkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(NetworkError::Usage(format!(
                "unsupported request method '{other}'"
            ))),
        }
    }
}

/// Request payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    /// No payload supplied.
    #[default]
    Empty,
    /// Structured data. Objects are merged with the configured default data.
    Json(Value),
    /// Raw text, sent unchanged.
    Text(String),
    /// Raw bytes, sent unchanged.
    Binary(Vec<u8>),
}

impl Payload {
    /// Serializes any value into a [`Payload::Json`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| NetworkError::Decode(format!("payload is not serializable: {err}")))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the payload's JSON object, if it is one.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self::Json(Value::Object(map))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Request headers. Names are lower-cased so that a request header replaces a
/// default header regardless of spelling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.0
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies every header of `other` on top of `self`.
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

impl From<()> for Headers {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K: AsRef<str>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: AsRef<str>, V: Into<String>> From<Vec<(K, V)>> for Headers {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{Headers, Method, NetworkError, Payload};

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("post".parse::<Method>().expect("must parse"), Method::Post);
        assert_eq!(" Delete ".parse::<Method>().expect("must parse"), Method::Delete);
        let err = "FETCH".parse::<Method>().expect_err("must fail");
        assert!(matches!(err, NetworkError::Usage(_)));
    }

    #[test]
    fn payload_conversions() {
        assert_eq!(Payload::from(()), Payload::Empty);
        assert_eq!(Payload::from("abc"), Payload::Text("abc".to_owned()));
        assert_eq!(Payload::from(vec![1u8, 2]), Payload::Binary(vec![1, 2]));
        let payload = Payload::from(json!({"id": 7}));
        assert_eq!(payload.as_object().map(|m| m.len()), Some(1));
        assert!(Payload::from(json!([1, 2])).as_object().is_none());
    }

    #[test]
    fn payload_from_serializable() {
        #[derive(serde::Serialize)]
        struct Order {
            id: u32,
        }
        let payload = Payload::json(&Order { id: 3 }).expect("must serialize");
        assert_eq!(payload, Payload::Json(json!({"id": 3})));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = Headers::from([("Content-Type", "text/plain")]);
        headers.insert("content-type", "application/xml");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/xml"));
    }
}

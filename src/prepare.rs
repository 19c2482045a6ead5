use crate::{
    options::SOURCE_HEADER, GlobalOptions, Headers, OutgoingRequest, Payload, RequestContext,
};

/// Builds the request sent on every attempt of `context`.
pub(crate) fn build_outgoing(context: &RequestContext, options: &GlobalOptions) -> OutgoingRequest {
    OutgoingRequest {
        url: resolve_url(context.uri(), options.base_uri.as_deref()),
        method: context.method(),
        headers: merge_headers(context.headers(), options),
        body: merge_body(context.data().clone(), options),
    }
}

/// Prefixes relative URIs with `base`; absolute URIs are left unchanged.
pub(crate) fn resolve_url(uri: &str, base: Option<&str>) -> String {
    let base = match base {
        Some(base) if !base.is_empty() && !is_absolute(uri) => base,
        _ => return uri.to_owned(),
    };
    if uri.is_empty() {
        return base.to_owned();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        uri.trim_start_matches('/')
    )
}

fn is_absolute(uri: &str) -> bool {
    match uri.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Object payloads get the default data underneath them; request keys win.
/// A missing payload becomes the default data itself.
pub(crate) fn merge_body(data: Payload, options: &GlobalOptions) -> Payload {
    let Some(defaults) = options.data.as_ref() else {
        return data;
    };
    match data {
        Payload::Json(serde_json::Value::Object(fields)) => {
            let mut merged = defaults.clone();
            merged.extend(fields);
            Payload::from(merged)
        }
        Payload::Empty => Payload::from(defaults.clone()),
        other => other,
    }
}

pub(crate) fn merge_headers(request: &Headers, options: &GlobalOptions) -> Headers {
    let mut headers = Headers::from([
        ("content-type", options.content_type()),
        (SOURCE_HEADER, options.source()),
    ]);
    headers.extend(request);
    headers
}

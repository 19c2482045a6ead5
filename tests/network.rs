use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use futures_util::{future::BoxFuture, FutureExt};
use netchain::{
    Event, EventPayload, GlobalOptions, LoadingHandle, Method, Network, NetworkError,
    OutgoingRequest, Payload, Response, Transport, TransportFailure,
};
use serde::Deserialize;
use serde_json::json;

enum Outcome {
    Respond(Response),
    Fail(&'static str),
}

fn respond(status: u16, body: &str) -> Outcome {
    Outcome::Respond(Response::new(status, body))
}

#[derive(Clone, Default)]
struct Scripted {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    seen: Arc<Mutex<Vec<OutgoingRequest>>>,
}

impl Scripted {
    fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            seen: Arc::default(),
        }
    }

    fn attempts(&self) -> usize {
        self.seen.lock().expect("seen lock").len()
    }

    fn seen(&self) -> Vec<OutgoingRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Transport for Scripted {
    fn send(&self, request: OutgoingRequest) -> BoxFuture<'static, Result<Response, TransportFailure>> {
        self.seen.lock().expect("seen lock").push(request);
        let outcome = self
            .outcomes
            .lock()
            .expect("outcome lock")
            .pop_front()
            .unwrap_or(Outcome::Fail("no scripted outcome left"));
        let result = match outcome {
            Outcome::Respond(response) => Ok(response),
            Outcome::Fail(message) => Err(message.into()),
        };
        futures_util::future::ready(result).boxed()
    }
}

fn network(outcomes: Vec<Outcome>) -> (Network, Scripted) {
    let transport = Scripted::new(outcomes);
    (Network::new(transport.clone()), transport)
}

fn record(network: &Network) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for event in [Event::Start, Event::End, Event::Response, Event::Error] {
        let log = Arc::clone(&log);
        network.on(event, move |payload| {
            let entry = match payload {
                EventPayload::Attempt { attempt, .. } => format!("{event}:{attempt}"),
                EventPayload::Response(response) => format!("{event}:{}", response.status),
                _ => event.to_string(),
            };
            log.lock().expect("log lock").push(entry);
        });
    }
    log
}

fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

#[tokio::test]
async fn default_request_makes_one_attempt_on_http_failure() {
    let (network, transport) = network(vec![respond(500, "boom"), respond(200, "ok")]);
    let log = record(&network);

    let err = network
        .get("/orders", (), ())
        .await
        .expect_err("request must fail");

    assert_eq!(err.status(), Some(500));
    assert_eq!(transport.attempts(), 1);
    assert_eq!(entries(&log), vec!["start", "end:0", "response:500", "error"]);
}

#[tokio::test]
async fn default_request_makes_one_attempt_on_transport_failure() {
    let (network, transport) = network(vec![Outcome::Fail("connection reset")]);
    let log = record(&network);

    let err = network
        .post("/orders", json!({"id": 1}), ())
        .await
        .expect_err("request must fail");

    match err {
        NetworkError::Transport(inner) => assert_eq!(inner.to_string(), "connection reset"),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(transport.attempts(), 1);
    assert_eq!(entries(&log), vec!["start", "end:0", "error"]);
}

#[tokio::test]
async fn retry_succeeds_on_third_attempt() {
    let (network, transport) = network(vec![
        Outcome::Fail("timeout"),
        Outcome::Fail("timeout"),
        respond(200, "third"),
    ]);
    let log = record(&network);

    let response = network
        .get("/orders", (), ())
        .enable_retry(2)
        .await
        .expect("request must succeed after retries");

    assert_eq!(response.body, "third");
    assert_eq!(transport.attempts(), 3);
    assert_eq!(
        entries(&log),
        vec!["start", "end:0", "end:1", "end:2", "response:200"]
    );
}

#[tokio::test]
async fn retry_budget_bounds_attempts_and_settles_once() {
    let (network, transport) = network((0..6).map(|_| respond(503, "busy")).collect());
    let log = record(&network);

    let err = network
        .get("/orders", (), ())
        .enable_retry(3)
        .await
        .expect_err("request must fail");

    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.attempts(), 4);
    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| e.starts_with("start")).count(), 1);
    assert_eq!(log.iter().filter(|e| e.starts_with("end")).count(), 4);
    assert_eq!(log.iter().filter(|e| *e == "error").count(), 1);
    assert_eq!(log.last().map(String::as_str), Some("error"));
}

#[tokio::test]
async fn retries_reuse_the_same_outgoing_request() {
    let (network, transport) = network(vec![respond(500, ""), respond(200, "")]);
    network.config(GlobalOptions::new().with_base_uri("https://api.x"));

    network
        .post("/orders", json!({"id": 1}), [("x-trace", "1")])
        .enable_retry(1)
        .await
        .expect("request must succeed");

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn predicate_retries_http_success_flagged_as_failed() {
    let (network, transport) = network(vec![
        respond(200, r#"{"code":1}"#),
        respond(200, r#"{"code":0}"#),
    ]);

    let response = network
        .get("/orders", (), ())
        .enable_retry_when(1, |response| response.body.contains(r#""code":1"#))
        .await
        .expect("request must succeed");

    assert_eq!(response.body, r#"{"code":0}"#);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn flagged_final_response_is_application_failure() {
    let (network, transport) = network(vec![
        respond(200, r#"{"code":1}"#),
        respond(200, r#"{"code":1}"#),
    ]);

    let err = network
        .get("/orders", (), ())
        .enable_retry_when(1, |response| response.body.contains(r#""code":1"#))
        .await
        .expect_err("request must fail");

    assert_eq!(err.status(), Some(200));
    assert_eq!(
        err.response().map(|r| r.body.as_str()),
        Some(r#"{"code":1}"#)
    );
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn panicking_predicate_settles_as_application_failure() {
    let (network, transport) = network(vec![
        respond(200, "first"),
        respond(200, "second"),
        respond(200, "third"),
    ]);
    let log = record(&network);

    let settled = tokio::spawn(async move {
        network
            .get("/orders", (), ())
            .enable_retry_when(2, |_| -> bool { panic!("predicate failed") })
            .await
    })
    .await
    .expect("dispatch must not unwind");

    let err = settled.expect_err("request must fail");
    assert!(matches!(err, NetworkError::Http { .. }));
    assert_eq!(err.status(), Some(200));
    assert_eq!(err.response().map(|r| r.body.as_str()), Some("first"));
    assert_eq!(transport.attempts(), 1);
    assert_eq!(entries(&log), vec!["start", "end:0", "response:200", "error"]);
}

#[tokio::test]
async fn not_modified_is_success() {
    let (network, _) = network(vec![respond(304, "")]);

    let response = network
        .get("/orders", (), ())
        .await
        .expect("304 must resolve");

    assert_eq!(response.status, 304);
}

#[tokio::test]
async fn base_uri_prefixes_relative_uri() {
    let (network, transport) = network(vec![respond(200, "")]);
    network.config(GlobalOptions::new().with_base_uri("https://api.x/"));

    network.get("/orders", (), ()).await.expect("must succeed");

    assert_eq!(transport.seen()[0].url, "https://api.x/orders");
}

#[tokio::test]
async fn absolute_uri_bypasses_base_uri() {
    let (network, transport) = network(vec![respond(200, "")]);
    network.config(GlobalOptions::new().with_base_uri("https://api.x/"));

    network
        .get("https://other.com/x", (), ())
        .await
        .expect("must succeed");

    assert_eq!(transport.seen()[0].url, "https://other.com/x");
}

#[tokio::test]
async fn second_config_fully_replaces_first() {
    let (network, transport) = network(vec![respond(200, "")]);
    network
        .config(
            GlobalOptions::new()
                .with_base_uri("https://api.x/")
                .with_data(json!({"token": "t"})),
        )
        .config(GlobalOptions::new().with_content_type("text/plain"));

    network.get("/orders", (), ()).await.expect("must succeed");

    let seen = transport.seen();
    assert_eq!(seen[0].url, "/orders");
    assert_eq!(seen[0].body, Payload::Empty);
    assert_eq!(seen[0].headers.get("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn default_data_and_headers_are_merged() {
    let (network, transport) = network(vec![respond(200, "")]);
    network.config(
        GlobalOptions::new()
            .with_data(json!({"token": "t", "page": 1}))
            .with_source("mini-app"),
    );

    network
        .post(
            "/orders",
            json!({"page": 2}),
            [("Content-Type", "text/plain"), ("X-Trace", "abc")],
        )
        .await
        .expect("must succeed");

    let request = &transport.seen()[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body, Payload::Json(json!({"token": "t", "page": 2})));
    assert_eq!(request.headers.get("content-type"), Some("text/plain"));
    assert_eq!(request.headers.get("x-request-source"), Some("mini-app"));
    assert_eq!(request.headers.get("x-trace"), Some("abc"));
}

#[tokio::test]
async fn request_accepts_parsed_method_and_raw_payload() {
    let (network, transport) = network(vec![respond(204, "")]);
    let method: Method = "put".parse().expect("must parse");

    network
        .request("/orders/1", "raw body", method, ())
        .await
        .expect("must succeed");

    let request = &transport.seen()[0];
    assert_eq!(request.method, Method::Put);
    assert_eq!(request.body, Payload::Text("raw body".to_owned()));
}

#[tokio::test]
async fn nothing_is_sent_before_the_chain_is_awaited() {
    let (network, transport) = network(vec![respond(200, "")]);
    let log = record(&network);

    let chain = network.get("/orders", (), ());
    assert_eq!(transport.attempts(), 0);
    assert!(entries(&log).is_empty());

    chain.await.expect("must succeed");
    assert_eq!(transport.attempts(), 1);
    assert_eq!(entries(&log)[0], "start");
}

#[tokio::test]
async fn retry_enabled_after_then_covers_the_request() {
    let (network, transport) = network(vec![respond(500, ""), respond(200, "later")]);

    let body = network
        .get("/orders", (), ())
        .then(|response| Ok(response.body))
        .enable_retry(1)
        .await
        .expect("must succeed");

    assert_eq!(body, "later");
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn merge_combines_results_under_names() {
    let (network, _) = network(vec![respond(200, r#"{"a":1}"#)]);
    let (other_network, _) = network_pair_with(r#"{"b":2}"#);

    let merged = network
        .get("/base", (), ())
        .json()
        .merge(other_network.get("/other", (), ()).json(), "extra")
        .expect("merge key is valid")
        .await
        .expect("merge must succeed");

    assert_eq!(
        merged.into_value(),
        json!({"original": {"a": 1}, "extra": {"b": 2}})
    );
}

fn network_pair_with(body: &str) -> (Network, Scripted) {
    let transport = Scripted::new(vec![Outcome::Respond(Response::new(200, body))]);
    (Network::new(transport.clone()), transport)
}

#[tokio::test]
async fn repeated_merges_accumulate_in_call_order() {
    let (network, _) = network(vec![respond(200, r#"{"a":1}"#)]);
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let order = Arc::clone(&order);
        async move {
            order.lock().expect("order lock").push("first");
            Ok::<_, NetworkError>(json!(1))
        }
    };
    let second = {
        let order = Arc::clone(&order);
        async move {
            order.lock().expect("order lock").push("second");
            Ok::<_, NetworkError>(json!(2))
        }
    };

    let merged = network
        .get("/base", (), ())
        .json()
        .merge(first, "x")
        .expect("valid key")
        .merge(second, "y")
        .expect("valid key")
        .await
        .expect("merge must succeed");

    assert_eq!(
        merged.into_value(),
        json!({"original": {"a": 1}, "x": 1, "y": 2})
    );
    assert_eq!(*order.lock().expect("order lock"), vec!["first", "second"]);
}

#[tokio::test]
async fn merge_with_reserved_key_fails_synchronously() {
    let (network, transport) = network(vec![respond(200, "{}")]);

    let err = network
        .get("/base", (), ())
        .merge(async { Ok::<_, NetworkError>(json!(1)) }, "original")
        .expect_err("reserved key must be rejected");

    assert!(matches!(err, NetworkError::Usage(_)));
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn merge_propagates_other_rejection() {
    let (network, _) = network(vec![respond(200, "{}")]);

    let err = network
        .get("/base", (), ())
        .json()
        .merge(
            async { Err::<serde_json::Value, _>(NetworkError::handler("other failed")) },
            "extra",
        )
        .expect("valid key")
        .await
        .expect_err("merge must fail");

    assert!(matches!(err, NetworkError::Handler(_)));
}

fn count_errors(network: &Network) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    network.on(Event::Error, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test]
async fn then_without_error_handler_publishes_rejection() {
    let (network, _) = network(vec![respond(500, "")]);
    let errors = count_errors(&network);

    let err = network
        .get("/orders", (), ())
        .then(|response| Ok(response.status))
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(500));
    // One from the dispatcher, one from the unhandled `then`.
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn then_with_error_handler_keeps_rejection_local() {
    let (network, _) = network(vec![respond(500, "")]);
    let errors = count_errors(&network);

    let status = network
        .get("/orders", (), ())
        .then_or_else(
            |response| Ok(response.status),
            |err| Ok(err.status().unwrap_or_default() + 1),
        )
        .await
        .expect("error handler recovers");

    assert_eq!(status, 501);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn catch_recovers_from_rejection() {
    let (network, _) = network(vec![Outcome::Fail("offline")]);

    let response = network
        .get("/orders", (), ())
        .catch(|err| Ok(Response::new(599, err.to_string())))
        .await
        .expect("catch recovers");

    assert_eq!(response.status, 599);
    assert_eq!(response.body, "transport error: offline");
}

#[tokio::test]
async fn complete_runs_on_both_paths_and_passes_value_through() {
    let (network, _) = network(vec![respond(200, "ok"), respond(404, "")]);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&calls);
    let response = network
        .get("/a", (), ())
        .complete(move |result| seen.lock().expect("lock").push(result.is_ok()))
        .await
        .expect("must succeed");
    assert_eq!(response.body, "ok");

    let seen = Arc::clone(&calls);
    let err = network
        .get("/b", (), ())
        .complete(move |result| seen.lock().expect("lock").push(result.is_ok()))
        .await
        .expect_err("must fail");
    assert_eq!(err.status(), Some(404));

    assert_eq!(*calls.lock().expect("lock"), vec![true, false]);
}

fn loading_counters(network: &Network) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let shown = Arc::new(AtomicUsize::new(0));
    let dismissed = Arc::new(AtomicUsize::new(0));
    let (s, d) = (Arc::clone(&shown), Arc::clone(&dismissed));
    network.config(GlobalOptions::new().with_loading(move |message, _duration| {
        assert_eq!(message, "Loading");
        s.fetch_add(1, Ordering::SeqCst);
        let d = Arc::clone(&d);
        Some(LoadingHandle::new(move || {
            d.fetch_add(1, Ordering::SeqCst);
        }))
    }));
    (shown, dismissed)
}

#[tokio::test]
async fn loading_indicator_is_dismissed_once_on_success_and_failure() {
    let (network, _) = network(vec![respond(200, ""), Outcome::Fail("offline")]);
    let (shown, dismissed) = loading_counters(&network);

    network
        .get("/a", (), ())
        .show_loading("Loading")
        .await
        .expect("must succeed");
    assert_eq!(shown.load(Ordering::SeqCst), 1);
    assert_eq!(dismissed.load(Ordering::SeqCst), 1);

    network
        .get("/b", (), ())
        .show_loading("Loading")
        .await
        .expect_err("must fail");
    assert_eq!(shown.load(Ordering::SeqCst), 2);
    assert_eq!(dismissed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn loading_indicator_is_dismissed_when_chain_is_dropped() {
    let (network, transport) = network(vec![respond(200, "")]);
    let (shown, dismissed) = loading_counters(&network);

    let chain = network.get("/a", (), ()).show_loading("Loading");
    assert_eq!(shown.load(Ordering::SeqCst), 1);
    drop(chain);

    assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn show_loading_without_factory_is_noop() {
    let (network, _) = network(vec![respond(200, "ok")]);

    let response = network
        .get("/a", (), ())
        .show_loading("Loading")
        .await
        .expect("must succeed");

    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn json_decodes_into_typed_value() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u32,
    }

    let (network, _) = network(vec![respond(200, r#"{"id":7}"#)]);

    let order: Order = network
        .get("/orders/7", (), ())
        .json_as()
        .await
        .expect("must decode");

    assert_eq!(order, Order { id: 7 });
}

#[tokio::test]
async fn json_decode_failure_rejects_chain() {
    let (network, _) = network(vec![respond(200, "<html>")]);

    let err = network
        .get("/orders", (), ())
        .json()
        .await
        .expect_err("must fail to decode");

    assert!(matches!(err, NetworkError::Decode(_)));
}

#[tokio::test]
async fn unsubscribed_handler_stops_receiving_events() {
    let (network, _) = network(vec![respond(200, ""), respond(200, "")]);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = network.subscribe(Event::Start, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    network.get("/a", (), ()).await.expect("must succeed");
    assert!(network.off(id));
    network.get("/b", (), ()).await.expect("must succeed");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

use netchain::{Event, EventPayload, GlobalOptions, LoadingHandle, Network};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_uri =
        std::env::var("NETCHAIN_BASE_URI").unwrap_or_else(|_| "https://httpbin.org/".to_owned());

    let network = Network::default().with_options(
        GlobalOptions::new()
            .with_base_uri(base_uri)
            .with_data(json!({"client": "demo"}))
            .with_retry_backoff_ms(200)
            .with_loading(|message, _| {
                println!("[loading] {message}");
                Some(LoadingHandle::new(|| println!("[loading] done")))
            }),
    );

    network
        .on(Event::Start, |payload| {
            if let EventPayload::Request(context) = payload {
                println!("-> {} {}", context.method(), context.uri());
            }
        })
        .on(Event::Error, |payload| {
            if let EventPayload::Error(err) = payload {
                eprintln!("!! {err}");
            }
        });

    let echoed = network
        .post("/anything", json!({"item": "tea"}), [("x-trace", "demo")])
        .show_loading("Placing order")
        .enable_retry(2)
        .json()
        .await?;
    println!("{echoed:#}");

    let merged = network
        .get("/uuid", (), ())
        .json()
        .merge(network.get("/ip", (), ()).json(), "ip")?
        .await?;
    println!("{:#}", merged.into_value());

    Ok(())
}

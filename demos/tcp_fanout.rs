//! TCP fan-out demo
//!
//! Starts two local receivers, loads a shorthand config pointing at them and
//! publishes a handful of events over the length-prefixed TCP transport.
//!
//! Run with: cargo run -p multidc_sink_demos --bin tcp_fanout

use std::time::Duration;

use config_loader::{ConfigFormat, ConfigLoader};
use contracts::Event;
use fanout::{FanoutPublisher, TcpReceiver};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_with_config(observability::ObservabilityConfig::new("tcp-demo"))?;

    let (tx, mut rx) = mpsc::channel(64);
    let mut servers = Vec::new();
    for _ in 0..2 {
        let receiver = TcpReceiver::bind("127.0.0.1:0").await?;
        servers.push(receiver.local_addr()?.to_string());
        tokio::spawn(receiver.run(tx.clone()));
    }
    drop(tx);

    let config = format!(
        r#"
bootstrap_servers = "{}"
topic = "myTopic"
partition = 0

[sink]
name = "tcp-demo"
min_successful_destinations = 2
"#,
        servers.join(",")
    );
    let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml)?;
    tracing::info!(servers = ?servers, "Receivers started");

    let publisher = FanoutPublisher::from_blueprint(&blueprint).await?;
    for (i, symbol) in ["IBM", "WSO2", "ORCL"].into_iter().enumerate() {
        let event = Event::new("StockStream")
            .with("symbol", symbol)
            .with("price", 75.6)
            .with("volume", i as i64);
        let outcome = publisher.publish(&event).await?;
        println!("{symbol}: {outcome}");
    }

    let report = publisher.shutdown().await;
    tracing::info!(closed = report.closed.len(), "Publisher closed");

    while let Ok(Some(record)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        println!(
            "{} <- {}/{} @{} ({} bytes)",
            record.peer,
            record.topic,
            record.partition,
            record.offset,
            record.payload.len()
        );
    }
    Ok(())
}

//! `listen` command implementation.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use contracts::Event;
use fanout::sessions::ReceivedRecord;
use fanout::TcpReceiver;

use super::shutdown_signal;
use crate::cli::ListenArgs;
use crate::error::CliError;

/// Execute the `listen` command
pub async fn run_listen(args: &ListenArgs) -> Result<()> {
    let receiver = TcpReceiver::bind(args.bind.as_str())
        .await
        .map_err(CliError::from)?;
    let local = receiver.local_addr().map_err(CliError::from)?;
    info!(addr = %local, "Listening for records");

    let (tx, mut rx) = mpsc::channel(256);
    let server = tokio::spawn(receiver.run(tx));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut received = 0u64;
    loop {
        let record = tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        received += 1;
        log_record(&record);

        if args.max_records > 0 && received >= args.max_records {
            info!(received, "Reached max records limit");
            break;
        }
    }

    drop(rx);
    server.abort();
    info!(received, "Listener stopped");
    Ok(())
}

fn log_record(record: &ReceivedRecord) {
    match serde_json::from_slice::<Event>(&record.payload) {
        Ok(event) => {
            let attributes = event
                .attributes
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            info!(
                peer = %record.peer,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                stream = %event.stream,
                %attributes,
                "Event received"
            );
        }
        Err(_) => {
            warn!(
                peer = %record.peer,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                bytes = record.payload.len(),
                "Non-JSON record received"
            );
        }
    }
}

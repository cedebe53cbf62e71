//! Event sources for the `run` command.

use std::path::PathBuf;
use std::time::Duration;

use contracts::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{CliError, Result};

const SYMBOLS: [&str; 3] = ["IBM", "WSO2", "ORCL"];

/// Where events come from
#[derive(Debug, Clone)]
pub enum EventSource {
    /// JSON-lines file, or stdin for "-"
    Lines(PathBuf),
    /// `count` sample trade events, `interval` apart
    Generated { count: u64, interval: Duration },
}

/// One item produced by a source; bad lines are reported, not fatal
pub type SourceItem = Result<Event>;

impl EventSource {
    /// Push every event into `tx`; returns the number of items produced
    pub async fn feed(self, tx: mpsc::Sender<SourceItem>) -> Result<u64> {
        match self {
            Self::Lines(path) if path.as_os_str() == "-" => {
                info!("Reading events from stdin");
                feed_lines(BufReader::new(tokio::io::stdin()), tx).await
            }
            Self::Lines(path) => {
                info!(path = %path.display(), "Reading events from file");
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| CliError::input_read(&path, e))?;
                feed_lines(BufReader::new(file), tx).await
            }
            Self::Generated { count, interval } => {
                info!(count, interval_ms = interval.as_millis() as u64, "Generating sample events");
                for i in 0..count {
                    if i > 0 && !interval.is_zero() {
                        tokio::time::sleep(interval).await;
                    }
                    if tx.send(Ok(sample_event(i))).await.is_err() {
                        return Ok(i);
                    }
                }
                Ok(count)
            }
        }
    }
}

/// Sample `(symbol, price, volume)` trade event
pub fn sample_event(i: u64) -> Event {
    let symbol = SYMBOLS[(i % SYMBOLS.len() as u64) as usize];
    Event::new("StockStream")
        .with("symbol", symbol)
        .with("price", 55.6 + (i % 10) as f64 * 0.5)
        .with("volume", 100 + i as i64)
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line_no: usize, line: &str) -> Option<SourceItem> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<Event>(trimmed)
            .map_err(|e| CliError::event_parse(line_no, e.to_string())),
    )
}

async fn feed_lines<R>(reader: R, tx: mpsc::Sender<SourceItem>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut produced = 0u64;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(item) = parse_line(line_no, &line) else {
            continue;
        };
        produced += 1;
        if tx.send(item).await.is_err() {
            break;
        }
    }

    debug!(lines = line_no, produced, "Input exhausted");
    Ok(produced)
}

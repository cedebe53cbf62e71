//! In-process broker for local runs and tests
//!
//! A `MemoryBroker` stands in for one cluster. Its availability and latency
//! can be changed at any time, and every stored record is broadcast to
//! subscribers so a consumer can observe deliveries as they land.

use bytes::Bytes;
use contracts::{Ack, BrokerSession, ContractError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 1024;

/// A record as stored by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: u64,
    pub payload: Bytes,
}

#[derive(Default)]
struct BrokerLog {
    partitions: HashMap<(String, i32), Vec<Bytes>>,
    next_partition: u32,
}

struct BrokerInner {
    name: String,
    partition_count: u32,
    reachable: AtomicBool,
    fail_close: AtomicBool,
    latency_ms: AtomicU64,
    open_count: AtomicU64,
    close_count: AtomicU64,
    log: Mutex<BrokerLog>,
    feed: broadcast::Sender<StoredRecord>,
}

/// Shared handle to one in-process broker
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Single-partition broker, reachable, no latency
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_partitions(name, 1)
    }

    pub fn with_partitions(name: impl Into<String>, partition_count: u32) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(BrokerInner {
                name: name.into(),
                partition_count: partition_count.max(1),
                reachable: AtomicBool::new(true),
                fail_close: AtomicBool::new(false),
                latency_ms: AtomicU64::new(0),
                open_count: AtomicU64::new(0),
                close_count: AtomicU64::new(0),
                log: Mutex::new(BrokerLog::default()),
                feed,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a new session against this broker
    pub fn session(&self) -> MemorySession {
        MemorySession {
            broker: self.clone(),
            open: false,
        }
    }

    /// Take the broker down (`false`) or bring it back (`true`)
    ///
    /// Open sessions notice on their next send.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    /// Delay applied to every send before it is stored
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Make `close` report an error (the session is still released)
    pub fn set_fail_close(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Live feed of stored records
    pub fn subscribe(&self) -> broadcast::Receiver<StoredRecord> {
        self.inner.feed.subscribe()
    }

    /// Payloads stored in one partition, in offset order
    pub fn records(&self, topic: &str, partition: i32) -> Vec<Bytes> {
        self.lock_log()
            .partitions
            .get(&(topic.to_string(), partition))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of records stored across all topics and partitions
    pub fn total_records(&self) -> usize {
        self.lock_log().partitions.values().map(Vec::len).sum()
    }

    pub fn open_count(&self) -> u64 {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.inner.close_count.load(Ordering::SeqCst)
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.inner.latency_ms.load(Ordering::SeqCst))
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, BrokerLog> {
        self.inner.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, topic: &str, partition: Option<i32>, payload: Bytes) -> Result<Ack, String> {
        let mut log = self.lock_log();
        let partition = match partition {
            Some(p) if p < 0 || p as u32 >= self.inner.partition_count => {
                return Err(format!(
                    "unknown partition {p} (topic has {})",
                    self.inner.partition_count
                ));
            }
            Some(p) => p,
            None => {
                let p = log.next_partition % self.inner.partition_count;
                log.next_partition = log.next_partition.wrapping_add(1);
                // partition_count fits in i32 for any realistic broker
                p as i32
            }
        };

        let records = log
            .partitions
            .entry((topic.to_string(), partition))
            .or_default();
        let offset = records.len() as u64;
        records.push(payload.clone());
        drop(log);

        // No subscribers is fine
        let _ = self.inner.feed.send(StoredRecord {
            topic: topic.to_string(),
            partition,
            offset,
            payload,
        });

        Ok(Ack {
            partition: Some(partition),
            offset: Some(offset),
        })
    }
}

/// Session against a [`MemoryBroker`]
pub struct MemorySession {
    broker: MemoryBroker,
    open: bool,
}

impl BrokerSession for MemorySession {
    fn address(&self) -> &str {
        self.broker.name()
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        if !self.broker.is_reachable() {
            return Err(ContractError::session_connection(
                self.broker.name(),
                "broker unreachable",
            ));
        }
        self.broker.inner.open_count.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    async fn send(
        &mut self,
        payload: Bytes,
        topic: &str,
        partition: Option<i32>,
    ) -> Result<Ack, ContractError> {
        if !self.open {
            return Err(ContractError::SessionNotOpen {
                destination: self.broker.name().to_string(),
            });
        }

        let latency = self.broker.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.broker.is_reachable() {
            self.open = false;
            return Err(ContractError::session_connection(
                self.broker.name(),
                "connection reset by broker",
            ));
        }

        self.broker
            .append(topic, partition, payload)
            .map_err(|e| ContractError::session_send(self.broker.name(), e))
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.open = false;
        self.broker.inner.close_count.fetch_add(1, Ordering::SeqCst);
        if self.broker.inner.fail_close.load(Ordering::SeqCst) {
            return Err(ContractError::session_connection(
                self.broker.name(),
                "close handshake failed",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_robin_partitioning() {
        let broker = MemoryBroker::with_partitions("dc1", 2);
        let mut session = broker.session();
        session.open().await.unwrap();

        for i in 0..4u8 {
            session.send(Bytes::from(vec![i]), "t", None).await.unwrap();
        }

        assert_eq!(broker.records("t", 0).len(), 2);
        assert_eq!(broker.records("t", 1).len(), 2);
        assert_eq!(broker.total_records(), 4);
    }

    #[tokio::test]
    async fn test_unknown_partition_is_send_error() {
        let broker = MemoryBroker::new("dc1");
        let mut session = broker.session();
        session.open().await.unwrap();

        let err = session
            .send(Bytes::from_static(b"x"), "t", Some(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::SessionSend { .. }));
        assert!(!err.is_connection_level());
    }

    #[tokio::test]
    async fn test_outage_breaks_open_session() {
        let broker = MemoryBroker::new("dc1");
        let mut session = broker.session();
        session.open().await.unwrap();

        broker.set_reachable(false);
        let err = session
            .send(Bytes::from_static(b"x"), "t", None)
            .await
            .unwrap_err();
        assert!(err.is_connection_level());
        assert!(session.open().await.is_err());

        broker.set_reachable(true);
        session.open().await.unwrap();
        assert_eq!(broker.open_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_stored_records() {
        let broker = MemoryBroker::new("dc1");
        let mut feed = broker.subscribe();
        let mut session = broker.session();
        session.open().await.unwrap();

        session
            .send(Bytes::from_static(b"hello"), "t", Some(0))
            .await
            .unwrap();

        let record = feed.recv().await.unwrap();
        assert_eq!(record.offset, 0);
        assert_eq!(&record.payload[..], b"hello");
    }
}

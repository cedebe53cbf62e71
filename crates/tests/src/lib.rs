//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 内存 broker 上的多数据中心投递场景
//! - 配置文件 -> TCP 会话 -> 接收端的端到端测试

#[cfg(test)]
mod contract_tests {
    use contracts::{
        Ack, DeliveryResult, DestinationId, DestinationOutcome, FailureReason, PublishOutcome,
    };

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = PublishOutcome::new(vec![
            DestinationOutcome {
                destination: DestinationId::new("dc1:9092"),
                result: DeliveryResult::Delivered(Ack {
                    partition: Some(0),
                    offset: Some(7),
                }),
            },
            DestinationOutcome {
                destination: DestinationId::new("dc2:9092"),
                result: DeliveryResult::Failed {
                    reason: FailureReason::Timeout,
                },
            },
        ]);

        let json = serde_json::to_value(&outcome).unwrap();
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries[0]["destination"], "dc1:9092");
        assert_eq!(entries[0]["result"]["status"], "delivered");
        assert_eq!(entries[1]["result"]["status"], "failed");
        assert_eq!(entries[1]["result"]["reason"]["kind"], "timeout");
    }
}

#[cfg(test)]
mod fanout_scenarios {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use contracts::{AttributeValue, DestinationConfig, Event, FailureReason, OpenPolicy};
    use fanout::sessions::StoredRecord;
    use fanout::{
        BackoffPolicy, DestinationSetBuilder, EndpointIndex, FanoutError, FanoutPublisher,
        HealthState, JsonEncoder, MemoryBroker, PublisherSettings, WorkerSettings,
    };
    use tokio::sync::broadcast;

    const TOPIC: &str = "myTopic";

    fn settings(min_successful: usize, per_send_timeout: Duration) -> PublisherSettings {
        PublisherSettings {
            name: "scenario".into(),
            per_send_timeout,
            min_successful_destinations: min_successful,
            backoff: BackoffPolicy {
                failure_threshold: 2,
                base: Duration::from_millis(200),
                max: Duration::from_secs(2),
            },
            shutdown_grace: Duration::from_millis(50),
        }
    }

    async fn publisher_with(
        destinations: Vec<(DestinationConfig, &MemoryBroker)>,
        settings: PublisherSettings,
    ) -> FanoutPublisher {
        let worker = WorkerSettings {
            connect_timeout: Duration::from_millis(100),
            queue_capacity: 64,
        };
        let set = destinations
            .into_iter()
            .fold(
                DestinationSetBuilder::new(worker, OpenPolicy::BestEffort),
                |builder, (config, broker)| builder.session(&config, broker.session()),
            )
            .open()
            .await
            .unwrap();
        FanoutPublisher::new(set, Arc::new(JsonEncoder::new(64 * 1024)), settings)
    }

    async fn publisher(brokers: &[&MemoryBroker], settings: PublisherSettings) -> FanoutPublisher {
        let destinations = brokers
            .iter()
            .map(|b| (DestinationConfig::new(b.name(), TOPIC), *b))
            .collect();
        publisher_with(destinations, settings).await
    }

    fn event(id: i64) -> Event {
        Event::new("StockStream")
            .with("symbol", "IBM")
            .with("price", 75.6)
            .with("id", id)
    }

    fn decoded(record: &StoredRecord) -> Event {
        serde_json::from_slice(&record.payload).unwrap()
    }

    async fn next_record(feed: &mut broadcast::Receiver<StoredRecord>) -> StoredRecord {
        tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .expect("record did not arrive")
            .unwrap()
    }

    #[tokio::test]
    async fn test_every_event_reaches_every_destination() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let mut feed_a = a.subscribe();
        let mut feed_b = b.subscribe();
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(500))).await;

        for id in 1..=3 {
            let outcome = publisher.publish(&event(id)).await.unwrap();
            assert_eq!(outcome.delivered_count(), 2);
            assert!(!outcome.is_partial());
        }

        for feed in [&mut feed_a, &mut feed_b] {
            for id in 1..=3 {
                let record = next_record(feed).await;
                assert_eq!(record.topic, TOPIC);
                assert_eq!(decoded(&record).get("id"), Some(&AttributeValue::Int(id)));
            }
        }
        // Encoded once: both clusters hold identical bytes
        assert_eq!(a.records(TOPIC, 0), b.records(TOPIC, 0));

        assert!(publisher.shutdown().await.is_clean());
    }

    #[tokio::test]
    async fn test_unreachable_destination_does_not_fail_publish() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        b.set_reachable(false);
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(500))).await;

        for id in 1..=3 {
            let outcome = publisher.publish(&event(id)).await.unwrap();
            assert!(outcome.get("dc1:9092").unwrap().is_delivered());
            assert!(!outcome.get("dc2:9092").unwrap().is_delivered());
        }
        assert_eq!(a.total_records(), 3);
        assert_eq!(b.total_records(), 0);

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_destination_does_not_block_others() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let mut feed_a = a.subscribe();
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(150))).await;
        b.set_latency(Duration::from_secs(5));

        let started = Instant::now();
        let outcome = publisher.publish(&event(1)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(outcome.get("dc1:9092").unwrap().is_delivered());
        assert_eq!(
            outcome.get("dc2:9092"),
            Some(&contracts::DeliveryResult::Failed {
                reason: FailureReason::Timeout
            })
        );

        let record = next_record(&mut feed_a).await;
        assert_eq!(decoded(&record).get("id"), Some(&AttributeValue::Int(1)));

        let started = Instant::now();
        publisher.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_all_destinations_failing_is_an_error() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(200))).await;
        a.set_reachable(false);
        b.set_reachable(false);

        match publisher.publish(&event(1)).await {
            Err(FanoutError::AllDestinationsFailed { outcome }) => {
                assert_eq!(outcome.failed_count(), 2);
                assert_eq!(outcome.delivered_count(), 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_every_destination_suspended_is_an_error() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        a.set_reachable(false);
        b.set_reachable(false);
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(200))).await;

        match publisher.publish(&event(1)).await {
            Err(FanoutError::AllDestinationsFailed { outcome }) => {
                assert_eq!(outcome.skipped_count(), 2);
                assert_eq!(outcome.failed_count(), 0);
                assert_eq!(outcome.delivered_count(), 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(a.total_records() + b.total_records(), 0);

        publisher.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_deliver_every_event_once() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = Arc::new(publisher(&[&a, &b], settings(2, Duration::from_secs(1))).await);

        let producers: Vec<_> = (0..10i64)
            .map(|producer| {
                let publisher = Arc::clone(&publisher);
                tokio::spawn(async move {
                    for i in 0..10 {
                        publisher.publish(&event(producer * 10 + i)).await.unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        for broker in [&a, &b] {
            let mut ids: Vec<i64> = broker
                .records(TOPIC, 0)
                .iter()
                .map(|payload| {
                    let event: Event = serde_json::from_slice(payload).unwrap();
                    match event.get("id") {
                        Some(AttributeValue::Int(id)) => *id,
                        other => panic!("unexpected id: {other:?}"),
                    }
                })
                .collect();
            ids.sort_unstable();
            assert_eq!(ids, (0..100).collect::<Vec<_>>());
        }

        for status in publisher.health() {
            assert_eq!(status.health.state, HealthState::Healthy);
            assert_eq!(status.health.consecutive_failures, 0);
            assert_eq!(status.metrics.delivered_count, 100);
            assert_eq!(status.metrics.failure_count, 0);
        }

        let publisher = Arc::try_unwrap(publisher).ok().expect("publisher still shared");
        assert!(publisher.shutdown().await.is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_retry_per_backoff_window_with_concurrent_publishers() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        b.set_reachable(false);
        let settings = PublisherSettings {
            backoff: BackoffPolicy {
                failure_threshold: 1,
                base: Duration::from_millis(100),
                max: Duration::from_secs(30),
            },
            ..settings(1, Duration::from_millis(300))
        };
        let publisher = Arc::new(publisher(&[&a, &b], settings).await);

        // Backoff runs out while dc2 is back but hanging
        tokio::time::sleep(Duration::from_millis(150)).await;
        b.set_reachable(true);
        b.set_latency(Duration::from_secs(2));

        let mut calls = Vec::new();
        for id in 0..8 {
            let publisher = Arc::clone(&publisher);
            calls.push(tokio::spawn(async move { publisher.publish(&event(id)).await }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut attempted = 0;
        for call in calls {
            let outcome = call.await.unwrap().unwrap();
            if !outcome.get("dc2:9092").unwrap().is_skipped() {
                attempted += 1;
            }
        }
        assert_eq!(attempted, 1);
        assert_eq!(a.total_records(), 8);

        let health = &publisher.health()[1].health;
        assert_eq!(health.state, HealthState::Suspended);
        assert!(!health.retry_in_flight);
        assert_eq!(health.consecutive_failures, 2);
        assert_eq!(
            publisher.settings().backoff.delay(health.consecutive_failures),
            Duration::from_millis(200)
        );

        let publisher = Arc::try_unwrap(publisher).ok().expect("publisher still shared");
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_suspended_destination_recovers_after_backoff() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(200))).await;
        let dc2 = EndpointIndex::new(1);
        b.set_reachable(false);

        publisher.publish(&event(1)).await.unwrap();
        assert_eq!(publisher.health_state(dc2), HealthState::Degraded);
        publisher.publish(&event(2)).await.unwrap();
        assert_eq!(publisher.health_state(dc2), HealthState::Suspended);

        let outcome = publisher.publish(&event(3)).await.unwrap();
        assert!(outcome.get("dc2:9092").unwrap().is_skipped());

        b.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let outcome = publisher.publish(&event(4)).await.unwrap();
        assert!(outcome.get("dc2:9092").unwrap().is_delivered());
        assert_eq!(publisher.health_state(dc2), HealthState::Healthy);
        assert_eq!(b.total_records(), 1);
        assert_eq!(a.total_records(), 4);

        let status = &publisher.health()[1];
        assert_eq!(status.health.consecutive_failures, 0);
        assert!(status.metrics.reconnect_count >= 1);

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_fixed_and_broker_assigned_partitions() {
        let a = MemoryBroker::with_partitions("dc1:9092", 3);
        let b = MemoryBroker::with_partitions("dc2:9092", 3);
        let publisher = publisher_with(
            vec![
                (DestinationConfig::new("dc1:9092", TOPIC).with_partition(2), &a),
                (DestinationConfig::new("dc2:9092", TOPIC), &b),
            ],
            settings(2, Duration::from_millis(500)),
        )
        .await;

        for id in 0..3 {
            let outcome = publisher.publish(&event(id)).await.unwrap();
            match outcome.get("dc1:9092") {
                Some(contracts::DeliveryResult::Delivered(ack)) => {
                    assert_eq!(ack.partition, Some(2))
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }

        assert_eq!(a.records(TOPIC, 2).len(), 3);
        for partition in 0..3 {
            assert_eq!(b.records(TOPIC, partition).len(), 1);
        }

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_submission_order_preserved_per_destination() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(500))).await;

        let events: Vec<Event> = (0..20).map(event).collect();
        let results = publisher.publish_batch(&events).await;
        assert!(results.iter().all(Result::is_ok));

        for broker in [&a, &b] {
            let ids: Vec<AttributeValue> = broker
                .records(TOPIC, 0)
                .iter()
                .map(|payload| {
                    let event: Event = serde_json::from_slice(payload).unwrap();
                    event.get("id").cloned().unwrap()
                })
                .collect();
            let expected: Vec<AttributeValue> = (0..20).map(AttributeValue::Int).collect();
            assert_eq!(ids, expected);
        }

        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session_despite_close_errors() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(500))).await;
        publisher.publish(&event(1)).await.unwrap();
        a.set_fail_close(true);

        let report = publisher.shutdown().await;
        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "dc1:9092");
        assert!(report.closed.iter().any(|id| *id == "dc2:9092"));
        assert_eq!(a.close_count(), 1);
        assert_eq!(b.close_count(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_feed_metrics_aggregator() {
        let a = MemoryBroker::new("dc1:9092");
        let b = MemoryBroker::new("dc2:9092");
        let publisher = publisher(&[&a, &b], settings(1, Duration::from_millis(200))).await;
        let mut aggregator = observability::PublishMetricsAggregator::new();

        aggregator.update(&publisher.publish(&event(1)).await.unwrap(), 1.0);
        b.set_reachable(false);
        aggregator.update(&publisher.publish(&event(2)).await.unwrap(), 2.0);

        let summary = aggregator.summary();
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.fully_delivered, 1);
        assert_eq!(summary.partially_delivered, 1);
        assert_eq!(summary.per_destination["dc2:9092"].failed, 1);

        publisher.shutdown().await;
    }
}

#[cfg(test)]
mod config_e2e {
    use std::io::Write;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Event;
    use fanout::sessions::ReceivedRecord;
    use fanout::{FanoutError, FanoutPublisher, TcpReceiver};
    use tokio::sync::mpsc;

    async fn spawn_receiver() -> (String, mpsc::Receiver<ReceivedRecord>) {
        let receiver = TcpReceiver::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(receiver.run(tx));
        (addr, rx)
    }

    #[test]
    fn test_shorthand_expands_to_one_destination_per_server() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
bootstrap_servers = "localhost:9092, localhost:9093,localhost:9094"
topic = "myTopic"
partition = 0
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let destinations = blueprint.resolved_destinations();
        assert_eq!(destinations.len(), 3);
        assert_eq!(destinations[1].address, "localhost:9093");
        assert!(destinations
            .iter()
            .all(|d| d.topic == "myTopic" && d.partition == Some(0)));
    }

    #[tokio::test]
    async fn test_config_file_to_tcp_receivers() {
        let (addr1, mut rx1) = spawn_receiver().await;
        let (addr2, mut rx2) = spawn_receiver().await;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
bootstrap_servers = "{addr1},{addr2}"
topic = "myTopic"
partition = 0

[sink]
name = "e2e"
min_successful_destinations = 2
"#
        )
        .unwrap();

        let blueprint = ConfigLoader::load_from_path(file.path()).unwrap();
        let publisher = FanoutPublisher::from_blueprint(&blueprint).await.unwrap();
        let event = Event::new("StockStream")
            .with("symbol", "WSO2")
            .with("price", 55.6)
            .with("volume", 100i64);

        let outcome = publisher.publish(&event).await.unwrap();
        assert_eq!(outcome.delivered_count(), 2);

        for rx in [&mut rx1, &mut rx2] {
            let record = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(record.topic, "myTopic");
            assert_eq!(record.partition, 0);
            assert_eq!(record.offset, 0);
            let received: Event = serde_json::from_slice(&record.payload).unwrap();
            assert_eq!(received.stream, event.stream);
            assert_eq!(received.timestamp, event.timestamp);
            assert_eq!(received.get("symbol"), event.get("symbol"));
            assert_eq!(received.get("volume"), event.get("volume"));
        }

        assert!(publisher.shutdown().await.is_clean());
    }

    #[tokio::test]
    async fn test_nothing_reachable_fails_to_open() {
        // Grab a free port, then release it so nothing listens there
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let blueprint = ConfigLoader::load_from_str(
            &format!(
                r#"
[sink]
connect_timeout_ms = 200

[[destinations]]
address = "{addr}"
topic = "myTopic"
"#
            ),
            ConfigFormat::Toml,
        )
        .unwrap();

        match FanoutPublisher::from_blueprint(&blueprint).await {
            Err(FanoutError::NoReachableDestinations { attempted }) => assert_eq!(attempted, 1),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("publisher opened without a reachable destination"),
        }
    }
}

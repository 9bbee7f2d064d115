//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - RPC 经由内存 broker 的往返
//! - Sink 分片、shard 漂移重发与接收端重组
//! - 队列重启后的积压投递
//! - 配置文件驱动的组装

#[cfg(test)]
mod support {
    use std::time::Duration;

    use bytes::Bytes;
    use broker::InMemoryBroker;
    use contracts::{Chunk, SinkModule};
    use dispatcher::{AssembledMessage, ChunkAssembler};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Event {
        pub node: String,
        pub seq: u32,
        pub text: String,
    }

    impl Event {
        pub fn new(node: &str, seq: u32, text_len: usize) -> Self {
            Self {
                node: node.to_string(),
                seq,
                text: "x".repeat(text_len),
            }
        }
    }

    /// Events keyed by node, so one node's events share a shard
    pub struct Events;

    impl SinkModule for Events {
        type Message = Event;

        fn id(&self) -> &str {
            "Events"
        }

        fn routing_key(&self, message: &Event) -> Option<String> {
            Some(message.node.clone())
        }
    }

    /// Reassemble every message delivered on one partition of `topic`
    pub fn assemble_partition(broker: &InMemoryBroker, topic: &str, partition: i32) -> Vec<AssembledMessage> {
        let mut assembler = ChunkAssembler::default();
        broker
            .deliveries(topic)
            .into_iter()
            .filter(|d| d.partition == partition)
            .filter_map(|d| assembler.push(Chunk::decode(&d.payload).unwrap()))
            .collect()
    }

    pub fn decode_event(payload: &Bytes) -> Event {
        Events.unmarshal(payload).unwrap()
    }

    /// Poll `check` until it holds or two seconds pass
    pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }
}

#[cfg(test)]
mod rpc_e2e {
    use std::sync::Arc;
    use std::time::Duration;

    use broker::InMemoryBroker;
    use contracts::IpcError;
    use rpc_gateway::{EchoRequest, EchoRpcModule, RpcClientFactory};

    /// Controller at `Default`, one minion per remote location
    fn setup() -> (InMemoryBroker, RpcClientFactory<InMemoryBroker>) {
        let broker = InMemoryBroker::default();
        broker.bind_rpc(Arc::new(EchoRpcModule), "Minion-A", Some("minion-a"));
        broker.bind_rpc(Arc::new(EchoRpcModule), "Minion-B", None);
        let factory =
            RpcClientFactory::new(Arc::new(broker.clone()), "Default", Duration::from_secs(5))
                .unwrap();
        (broker, factory)
    }

    #[tokio::test]
    async fn test_echo_across_locations() {
        let (_broker, factory) = setup();
        let client = factory.get_client(Arc::new(EchoRpcModule));

        let a = client.execute(EchoRequest::new("HELLO!").at("Minion-A").on_system("minion-a"));
        let b = client.execute(EchoRequest::new("HELLO!").at("Minion-B"));
        let local = client.execute(EchoRequest::new("HELLO!"));

        for response in [a.await, b.await, local.await] {
            assert_eq!(response.unwrap().message, "HELLO!");
        }
    }

    #[tokio::test]
    async fn test_many_concurrent_requests_complete() {
        let (_broker, factory) = setup();
        let client = factory.get_client(Arc::new(EchoRpcModule));

        let pending: Vec<_> = (0..50)
            .map(|i| client.execute(EchoRequest::new(format!("msg-{i}")).at("Minion-B")))
            .collect();
        for (i, future) in pending.into_iter().enumerate() {
            assert_eq!(future.await.unwrap().message, format!("msg-{i}"));
        }
    }

    #[tokio::test]
    async fn test_failure_classes() {
        let (broker, factory) = setup();
        let client = factory.get_client(Arc::new(EchoRpcModule));
        let short = Duration::from_millis(100);

        let wrong_system = client
            .execute(EchoRequest::new("x").at("Minion-A").on_system("minion-z").with_ttl(short))
            .await;
        assert!(matches!(wrong_system, Err(IpcError::RequestTimedOut { .. })));

        let nobody = client.execute(EchoRequest::new("x").at("Nowhere")).await;
        assert!(matches!(
            nobody,
            Err(IpcError::RequestRejected { .. } | IpcError::RequestTimedOut { .. })
        ));

        let remote_error = client
            .execute(EchoRequest::new("Oops!").at("Minion-B").failing())
            .await;
        assert!(matches!(remote_error, Err(IpcError::RemoteExecution { .. })));

        broker.stop();
        let stopped = client.execute(EchoRequest::new("x").at("Minion-B")).await;
        assert!(matches!(stopped, Err(IpcError::RequestRejected { .. })));

        // Local calls keep working without the broker
        let local = client.execute(EchoRequest::new("still here")).await.unwrap();
        assert_eq!(local.message, "still here");
    }

    #[tokio::test]
    async fn test_unbound_location_stops_answering() {
        let (broker, factory) = setup();
        let client = factory.get_client(Arc::new(EchoRpcModule));
        assert!(client.execute(EchoRequest::new("x").at("Minion-B")).await.is_ok());

        broker.unbind_location("Minion-B");
        let err = client
            .execute(EchoRequest::new("x").at("Minion-B"))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::RequestRejected { .. }));
    }
}

#[cfg(test)]
mod sink_e2e {
    use std::sync::Arc;

    use broker::InMemoryBroker;
    use contracts::{Chunk, SinkConfig, TransportFault, TAG_DESTINATION, TAG_MESSAGE_SIZE};
    use dispatcher::{chunk_count, RetryPolicy, SinkDispatcher};

    use crate::support::{assemble_partition, decode_event, Event, Events};

    const CHUNK: usize = 64;

    fn dispatcher(broker: &InMemoryBroker) -> SinkDispatcher<InMemoryBroker> {
        SinkDispatcher::new(Arc::new(broker.clone()), &SinkConfig::default(), "Default")
            .with_max_chunk_size(CHUNK)
            .with_retry_policy(RetryPolicy::immediate())
    }

    #[tokio::test]
    async fn test_large_event_is_chunked_and_reassembled() {
        let broker = InMemoryBroker::default();
        let sink = dispatcher(&broker);
        let topic = sink.destination_for("Events");
        let event = Event::new("node-1", 1, 500);

        sink.dispatch(&Events, &topic, &event).await.unwrap();

        let deliveries = broker.deliveries(&topic);
        let partition = broker.partition_for("node-1");
        assert!(deliveries.iter().all(|d| d.partition == partition && d.key == "node-1"));

        let chunks: Vec<Chunk> = deliveries
            .iter()
            .map(|d| Chunk::decode(&d.payload).unwrap())
            .collect();
        let payload_len: usize = chunks.iter().map(|c| c.content.len()).sum();
        assert_eq!(chunks.len(), chunk_count(payload_len, CHUNK));

        let last = chunks.last().unwrap();
        assert_eq!(last.tracing_info.get(TAG_DESTINATION), Some(&topic));
        assert_eq!(last.tracing_info.get(TAG_MESSAGE_SIZE), Some(&payload_len.to_string()));

        let assembled = assemble_partition(&broker, &topic, partition);
        assert_eq!(assembled.len(), 1);
        assert_eq!(decode_event(&assembled[0].payload), event);
    }

    #[tokio::test]
    async fn test_shard_drift_restart_is_reassembled_on_one_partition() {
        let broker = InMemoryBroker::default();
        let sink = dispatcher(&broker);
        let topic = sink.destination_for("Events");
        let event = Event::new("node-1", 7, 150);
        let total = chunk_count(sink.envelope_for(&Events, &topic, &event).unwrap().size(), CHUNK);
        assert!(total >= 3);

        // Second chunk drifts; the restart stays on partition 0 throughout
        broker.force_partitions([0, 1].into_iter().chain(std::iter::repeat(0).take(total)));
        sink.dispatch(&Events, &topic, &event).await.unwrap();

        let deliveries = broker.deliveries(&topic);
        assert_eq!(deliveries.len(), 2 + total);
        assert_eq!(sink.metrics().snapshot().shard_drift_count, 1);

        let assembled = assemble_partition(&broker, &topic, 0);
        assert_eq!(assembled.len(), 1);
        assert_eq!(decode_event(&assembled[0].payload), event);
        assert!(assemble_partition(&broker, &topic, 1).is_empty());
    }

    #[tokio::test]
    async fn test_transient_faults_are_retried() {
        let broker = InMemoryBroker::default();
        let sink = dispatcher(&broker);
        let topic = sink.destination_for("Events");
        broker.inject_send_faults([
            TransportFault::Timeout("slow".into()),
            TransportFault::Unavailable("reconnecting".into()),
        ]);

        let event = Event::new("node-2", 3, 10);
        sink.dispatch(&Events, &topic, &event).await.unwrap();

        assert_eq!(sink.metrics().snapshot().retry_count, 2);
        let assembled = assemble_partition(&broker, &topic, broker.partition_for("node-2"));
        assert_eq!(decode_event(&assembled[0].payload), event);
    }

    #[tokio::test]
    async fn test_fatal_fault_aborts_dispatch() {
        let broker = InMemoryBroker::default();
        let sink = dispatcher(&broker);
        let topic = sink.destination_for("Events");
        broker.inject_send_faults([TransportFault::Other("topic deleted".into())]);

        let result = sink.dispatch(&Events, &topic, &Event::new("node-3", 1, 10)).await;
        assert!(result.is_err());
        assert!(broker.deliveries(&topic).is_empty());
    }
}

#[cfg(test)]
mod queue_e2e {
    use std::sync::Arc;

    use broker::InMemoryBroker;
    use contracts::{QueueConfig, SinkConfig};
    use dispatcher::{EnqueueResult, EnvelopeQueue, QueueingDispatcher, RetryPolicy, SinkDispatcher};
    use spillover_queue::{BincodeCodec, QueueOptions};

    use crate::support::{assemble_partition, decode_event, eventually, Event, Events};

    fn queue_config(dir: &std::path::Path) -> QueueConfig {
        QueueConfig {
            enabled: true,
            base_dir: dir.to_path_buf(),
            memory_capacity: 1,
            workers: 1,
            compaction_interval_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_backlog_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = queue_config(dir.path());
        let broker = InMemoryBroker::new(1);
        let sink = SinkDispatcher::new(Arc::new(broker.clone()), &SinkConfig::default(), "Default")
            .with_retry_policy(RetryPolicy::immediate());
        let topic = sink.destination_for("Events");
        let events: Vec<_> = (0..4).map(|i| Event::new("node-1", i, 20)).collect();

        // First run: nothing drains, the first event sits in memory
        {
            let queue = EnvelopeQueue::open("events", QueueOptions::from(&config), BincodeCodec::new())
                .unwrap();
            for (i, event) in events.iter().enumerate() {
                let envelope = sink.envelope_for(&Events, &topic, event).unwrap();
                let key = envelope.routing_key.clone();
                let expected = if i == 0 {
                    EnqueueResult::Immediate
                } else {
                    EnqueueResult::Deferred
                };
                assert_eq!(queue.enqueue(envelope, key).await.unwrap(), expected);
            }
        }

        // Second run: the disk backlog is delivered in order
        let frontend = QueueingDispatcher::start(sink, "events", &config).unwrap();
        assert!(eventually(|| broker.deliveries(&topic).len() == 3).await);
        assert!(eventually(|| frontend.queue().is_empty()).await);
        frontend.shutdown().await;

        let delivered: Vec<Event> = assemble_partition(&broker, &topic, 0)
            .iter()
            .map(|m| decode_event(&m.payload))
            .collect();
        assert_eq!(delivered, events[1..].to_vec());
    }

    #[tokio::test]
    async fn test_queueing_frontend_delivers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = queue_config(dir.path());
        config.memory_capacity = 8;
        let broker = InMemoryBroker::new(1);
        let sink = SinkDispatcher::new(Arc::new(broker.clone()), &SinkConfig::default(), "Default");
        let topic = sink.destination_for("Events");

        let frontend = QueueingDispatcher::start(sink, "ordered", &config).unwrap();
        let events: Vec<_> = (0..20).map(|i| Event::new("node-1", i, 5)).collect();
        for event in &events {
            frontend.dispatch(&Events, &topic, event).await.unwrap();
        }

        assert!(eventually(|| broker.deliveries(&topic).len() == events.len()).await);
        let metrics = Arc::clone(frontend.metrics());
        assert!(eventually(|| metrics.snapshot().dispatched_count == events.len() as u64).await);
        frontend.shutdown().await;

        let delivered: Vec<Event> = assemble_partition(&broker, &topic, 0)
            .iter()
            .map(|m| decode_event(&m.payload))
            .collect();
        assert_eq!(delivered, events);
    }
}

#[cfg(test)]
mod config_e2e {
    use std::sync::Arc;
    use std::time::Duration;

    use broker::InMemoryBroker;
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::SinkDispatcher;
    use rpc_gateway::{EchoRequest, EchoRpcModule, RpcClientFactory};

    use crate::support::{Event, Events};

    const CONFIG: &str = r#"
[identity]
location = "Controller"

[rpc]
default_timeout_ms = 2000

[sink]
max_chunk_size = 32
destination_prefix = "telemetry"
retry_max_attempts = 2
"#;

    #[tokio::test]
    async fn test_components_built_from_config() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let broker = InMemoryBroker::default();
        broker.bind_rpc(Arc::new(EchoRpcModule), "Minion", None);

        let factory = RpcClientFactory::from_config(Arc::new(broker.clone()), &config).unwrap();
        assert_eq!(factory.location(), "Controller");
        assert_eq!(factory.default_timeout(), Duration::from_secs(2));
        let client = factory.get_client(Arc::new(EchoRpcModule));
        let response = client
            .execute(EchoRequest::new("HELLO!").at("Minion"))
            .await
            .unwrap();
        assert_eq!(response.message, "HELLO!");

        let sink = SinkDispatcher::new(
            Arc::new(broker.clone()),
            &config.sink,
            config.identity.location.clone(),
        );
        assert_eq!(sink.max_chunk_size(), 32);
        let topic = sink.destination_for("Events");
        assert_eq!(topic, "telemetry.Events");
        sink.dispatch(&Events, &topic, &Event::new("n", 1, 100)).await.unwrap();
        assert!(broker.deliveries(&topic).len() > 1);
    }
}

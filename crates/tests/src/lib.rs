//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> 同步器的装配测试
//! - 模拟数据源 e2e 测试（无需真实传输层）
//! - 超时路径与运动补偿的端到端验证

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_output_topic_naming() {
        assert_eq!(
            contracts::synchronized_topic("/sensing/lidar/top/pointcloud"),
            "/sensing/lidar/top/pointcloud_synchronized"
        );
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{BTreeMap, HashMap};
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        DiagnosticLevel, NodeBlueprint, PointCloud, PointXYZI, RoundTrigger, SinkConfig,
        SinkType, SyncedCloudSet, TopicId, VelocitySample,
    };
    use dispatcher::{
        create_dispatcher, ChannelSink, DispatcherBuilder, DispatcherConfig, PublishedCloud,
        SinkHandle,
    };
    use ingestion::{InboundMessage, IngestionPipeline, SourceClock};
    use sync_engine::{RigidCloudTransformer, StaticFrameResolver, TimeSynchronizer};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    const NODE_TOML: &str = r#"
[synchronizer]
output_frame = "base_link"
input_topics = ["/lidar/top", "/lidar/left"]
timeout_sec = 0.1

[[frames]]
parent_frame = "base_link"
child_frame = "lidar_top"
transform = { location = { x = 0.0, y = 0.0, z = 2.0 }, rotation = { pitch = 0.0, yaw = 0.0, roll = 0.0 } }

[[frames]]
parent_frame = "base_link"
child_frame = "lidar_left"
transform = { location = { x = 0.0, y = 1.0, z = 1.5 }, rotation = { pitch = 0.0, yaw = 90.0, roll = 0.0 } }

[[sources.clouds]]
topic = "/lidar/top"
frame_id = "lidar_top"
frequency_hz = 20.0
num_points = 32
latency_ms = 5

[[sources.clouds]]
topic = "/lidar/left"
frame_id = "lidar_left"
frequency_hz = 20.0
num_points = 32
latency_ms = 15

[sources.velocity]
frequency_hz = 100.0
longitudinal_velocity = 5.0
"#;

    fn blueprint() -> NodeBlueprint {
        ConfigLoader::load_from_str(NODE_TOML, ConfigFormat::Toml).unwrap()
    }

    fn start_synchronizer(
        blueprint: &NodeBlueprint,
    ) -> (TimeSynchronizer, mpsc::Receiver<SyncedCloudSet>) {
        let transformer = Arc::new(RigidCloudTransformer::new(
            StaticFrameResolver::from_config(&blueprint.frames),
        ));
        let (tx, rx) = TimeSynchronizer::output_channel(&blueprint.synchronizer);
        let sync = TimeSynchronizer::spawn(blueprint.synchronizer.clone(), transformer, tx)
            .unwrap();
        (sync, rx)
    }

    /// Start the mock sources and pump their messages into `sync`.
    fn start_sources(
        blueprint: &NodeBlueprint,
        sync: TimeSynchronizer,
    ) -> (IngestionPipeline, JoinHandle<()>) {
        let mut ingestion = IngestionPipeline::from_config(&blueprint.sources, 256).unwrap();
        let mut rx = ingestion.take_receiver().unwrap();
        ingestion.start_all(SourceClock::new(100.0)).unwrap();

        let pump = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    InboundMessage::Cloud { topic, cloud } => {
                        sync.on_cloud(&topic, cloud).unwrap();
                    }
                    InboundMessage::Velocity(sample) => sync.on_velocity(sample),
                }
            }
        });
        (ingestion, pump)
    }

    /// End-to-end test: mock sources -> TimeSynchronizer -> Dispatcher -> ChannelSink
    ///
    /// 验证完整的数据流：
    /// 1. 模拟源按配置频率发布点云与车速
    /// 2. 同步器按轮发布，所有点云共享参考时间戳与输出坐标系
    /// 3. Dispatcher 将每个话题发布到 `<topic>_synchronized`
    #[tokio::test]
    async fn test_e2e_mock_pipeline() {
        let blueprint = blueprint();
        let (sync, sync_rx) = start_synchronizer(&blueprint);

        let (out_tx, mut out_rx) = mpsc::channel::<PublishedCloud>(64);
        let dispatcher = DispatcherBuilder::new(DispatcherConfig { sinks: vec![] }, sync_rx)
            .with_handle(SinkHandle::spawn(ChannelSink::new("capture", out_tx), 32))
            .build()
            .unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let (mut ingestion, pump) = start_sources(&blueprint, sync.clone());

        let mut published: Vec<PublishedCloud> = Vec::new();
        while published.len() < 10 {
            let item = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
                .await
                .expect("timed out waiting for synchronized clouds")
                .expect("channel sink closed");
            published.push(item);
        }

        ingestion.stop_all();
        pump.abort();
        sync.shutdown().await;

        let mut stamps_by_round: BTreeMap<u64, Vec<f64>> = BTreeMap::new();
        for item in &published {
            assert!(
                item.topic == "/lidar/top_synchronized" || item.topic == "/lidar/left_synchronized",
                "unexpected output topic {}",
                item.topic
            );
            assert_eq!(item.cloud.frame_id(), "base_link");
            assert!(item.cloud.stamp() > 99.0);
            assert_eq!(item.cloud.points().unwrap().len(), 32);
            stamps_by_round
                .entry(item.round_id)
                .or_default()
                .push(item.cloud.stamp());
        }

        // 同一轮内共享一个参考时间戳
        for stamps in stamps_by_round.values() {
            assert!(stamps.windows(2).all(|w| w[0] == w[1]), "stamps {stamps:?}");
        }
        // 轮号单调递增
        let ids: Vec<u64> = published.iter().map(|p| p.round_id).collect();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));

        assert!(sync.rounds_published() >= 5);
        drop(sync);
        let sinks = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sinks.len(), 1);
        assert!(sinks[0].1.written >= 5);
    }

    /// A disabled source never delivers: every round closes by timeout and
    /// the topic is reported as not synchronized.
    #[tokio::test]
    async fn test_e2e_disabled_source_times_out() {
        let mut blueprint = blueprint();
        blueprint.synchronizer.timeout_sec = 0.05;
        blueprint.synchronizer.input_offset = vec![0.0, 0.0];
        blueprint.sources.clouds[1].enabled = false;

        let (sync, mut sync_rx) = start_synchronizer(&blueprint);
        let (mut ingestion, pump) = start_sources(&blueprint, sync.clone());
        assert!(!ingestion.is_source_running("/lidar/left"));

        let mut sets = Vec::new();
        while sets.len() < 3 {
            let set = tokio::time::timeout(Duration::from_secs(2), sync_rx.recv())
                .await
                .expect("timed out waiting for a round")
                .expect("synchronizer output closed");
            sets.push(set);
        }

        ingestion.stop_all();
        pump.abort();

        for set in &sets {
            assert_eq!(set.meta.trigger, RoundTrigger::Timeout);
            assert!(set.clouds["/lidar/top"].is_some());
            assert!(set.clouds["/lidar/left"].is_none());
            assert_eq!(set.meta.missing_topics, vec![TopicId::from("/lidar/left")]);
            assert_eq!(set.meta.diagnostics.level, DiagnosticLevel::Warn);
            assert_eq!(
                set.reference_stamp,
                set.clouds["/lidar/top"].as_ref().map(PointCloud::stamp)
            );
        }

        let not_synced = sync.not_synchronized_topics();
        assert_eq!(not_synced.len(), 1);
        assert!(not_synced.contains("/lidar/left"));
        sync.shutdown().await;
    }

    /// Static transforms from the config and the velocity history both
    /// apply: `/a` is reprojected from `lidar_top` and moved forward by
    /// the distance driven between the two capture times.
    #[tokio::test(start_paused = true)]
    async fn test_e2e_reprojection_and_compensation() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[synchronizer]
output_frame = "base_link"
input_topics = ["/a", "/b"]

[[frames]]
parent_frame = "base_link"
child_frame = "lidar_top"
transform = { location = { x = 1.0, y = 0.0, z = 0.0 }, rotation = { pitch = 0.0, yaw = 0.0, roll = 0.0 } }
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let (sync, mut rx) = start_synchronizer(&blueprint);

        for i in 0..100 {
            sync.on_velocity(VelocitySample::new(i as f64 * 0.01, 10.0, 0.0));
        }

        let origin = [PointXYZI {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            intensity: 7.0,
        }];
        sync.on_cloud("/a", PointCloud::from_points(0.55, "lidar_top", &origin))
            .unwrap();
        sync.on_cloud("/b", PointCloud::from_points(0.5, "base_link", &origin))
            .unwrap();

        let set = rx.recv().await.unwrap();
        assert_eq!(set.meta.trigger, RoundTrigger::Complete);
        assert_eq!(set.reference_stamp, Some(0.5));

        let a = set.clouds["/a"].as_ref().unwrap().points().unwrap()[0];
        assert!((a.x - 1.5).abs() < 1e-4, "a.x = {}", a.x);
        assert!(a.y.abs() < 1e-4);
        assert_eq!(a.intensity, 7.0);

        let b = set.clouds["/b"].as_ref().unwrap().points().unwrap()[0];
        assert!(b.x.abs() < 1e-6);
        sync.shutdown().await;
    }

    /// Config file on disk -> synchronizer -> FileSink artifacts
    #[tokio::test]
    async fn test_config_file_to_file_sink() {
        let out_dir = tempfile::tempdir().unwrap();
        let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        config_file.write_all(NODE_TOML.as_bytes()).unwrap();

        let mut blueprint = ConfigLoader::load_from_path(config_file.path()).unwrap();
        blueprint.sinks.push(SinkConfig {
            name: "disk".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 8,
            params: HashMap::from([(
                "base_path".to_string(),
                out_dir.path().display().to_string(),
            )]),
        });

        let (sync, sync_rx) = start_synchronizer(&blueprint);
        let dispatcher = create_dispatcher(blueprint.sinks.clone(), sync_rx).unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let stamp = 10.0;
        let point = [PointXYZI {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            intensity: 1.0,
        }];
        sync.on_cloud("/lidar/top", PointCloud::from_points(stamp, "lidar_top", &point))
            .unwrap();
        sync.on_cloud(
            "/lidar/left",
            PointCloud::from_points(stamp, "lidar_left", &point),
        )
        .unwrap();

        sync.shutdown().await;
        drop(sync);
        let sinks = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sinks[0].1.written, 1);

        assert!(out_dir.path().join("meta/0.json").exists());
        assert!(out_dir.path().join("lidar/top_synchronized/0.ply").exists());
        assert!(out_dir.path().join("lidar/left_synchronized/0.ply").exists());
    }

    #[test]
    fn test_metrics_aggregator_over_rounds() {
        let mut aggregator = observability::RoundMetricsAggregator::new();
        let mut set = SyncedCloudSet {
            round_id: 0,
            reference_stamp: Some(1.0),
            frame_id: "base_link".to_string(),
            clouds: BTreeMap::from([
                ("/lidar/top".into(), Some(PointCloud::from_points(1.0, "base_link", &[]))),
                ("/lidar/left".into(), None),
            ]),
            meta: Default::default(),
        };
        set.meta.trigger = RoundTrigger::Timeout;
        aggregator.update(&set);

        let summary = aggregator.summary();
        assert_eq!(summary.total_rounds, 1);
        assert_eq!(summary.timeout_rounds, 1);
        assert_eq!(summary.topic_missing_counts["/lidar/left"], 1);
    }
}

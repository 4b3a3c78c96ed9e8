//! FileSink - writes rounds to disk with folder structure
//!
//! Layout under `base_path`:
//! - `meta/<round_id>.json` round metadata
//! - `<output_topic>/<round_id>.ply` one binary PLY per present cloud

use contracts::{ContractError, DataSink, PointCloud, RoundMeta, SyncedCloudSet};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

use super::published_clouds;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

#[derive(Serialize)]
struct RoundRecord<'a> {
    round_id: u64,
    reference_stamp: Option<f64>,
    frame_id: &'a str,
    published_topics: Vec<String>,
    meta: &'a RoundMeta,
}

/// Sink that writes rounds to disk files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    created_dirs: HashSet<PathBuf>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    fn write_round_to_disk(&mut self, set: &SyncedCloudSet) -> std::io::Result<()> {
        let round_id = set.round_id;
        let published: Vec<(String, &PointCloud)> = published_clouds(set).collect();

        // 1. Write round metadata
        let meta_dir = self.config.base_path.join("meta");
        self.ensure_dir(&meta_dir)?;
        let record = RoundRecord {
            round_id,
            reference_stamp: set.reference_stamp,
            frame_id: &set.frame_id,
            published_topics: published.iter().map(|(t, _)| t.clone()).collect(),
            meta: &set.meta,
        };
        let meta_file = File::create(meta_dir.join(format!("{}.json", round_id)))?;
        serde_json::to_writer(meta_file, &record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // 2. Write clouds
        for (topic, cloud) in published {
            let topic_dir = self.config.base_path.join(topic_dir_name(&topic));
            self.ensure_dir(&topic_dir)?;
            save_point_cloud(&topic_dir.join(format!("{}.ply", round_id)), cloud)?;
        }

        Ok(())
    }

    fn ensure_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }

    fn persist_round(&mut self, set: &SyncedCloudSet) -> Result<(), ContractError> {
        self.write_round_to_disk(set).map_err(|e| {
            error!(sink = %self.name, round_id = set.round_id, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

/// Relative directory for a topic: its path segments, minus empty and dot ones.
fn topic_dir_name(topic: &str) -> PathBuf {
    topic
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect()
}

fn save_point_cloud(path: &Path, cloud: &PointCloud) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    // Write PLY header
    writeln!(file, "ply")?;
    writeln!(file, "format binary_little_endian 1.0")?;
    writeln!(file, "comment frame_id {}", cloud.frame_id())?;
    writeln!(file, "comment stamp {}", cloud.stamp())?;
    writeln!(file, "element vertex {}", cloud.num_points)?;
    writeln!(file, "property float x")?;
    writeln!(file, "property float y")?;
    writeln!(file, "property float z")?;
    writeln!(file, "property float intensity")?;
    writeln!(file, "end_header")?;

    // Packed XYZI records
    let len = cloud.num_points as usize * cloud.point_stride as usize;
    file.write_all(&cloud.data[..len.min(cloud.data.len())])?;
    file.flush()
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, set),
        fields(sink = %self.name, round_id = set.round_id)
    )]
    async fn write(&mut self, set: &SyncedCloudSet) -> Result<(), ContractError> {
        self.persist_round(set)?;
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}

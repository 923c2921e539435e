//! Persistent metrics store
//!
//! Each table is a JSON-lines file in the store directory. Tables are loaded
//! into memory on open and served from there; writes append to the file and
//! gc rewrites it atomically. A table whose file cannot be read or parsed is
//! wiped and recreated from what is in memory.

use super::db::{
    ClusterTable, MetricsDb, MetricsDbStats, NodeTable, CLUSTER_TABLE, DEFAULT_RETENTION_HOURS,
    NODE_TABLE,
};
use super::snapshot::{ClusterMetricSnapshot, NodeMetricSnapshot};
use super::timeseries::{ClusterTimeseries, NodeTimeseries};
use crate::clock::Clock;
use crate::error::MetricsDbError;
use crate::models::{ApplicationId, ClusterId};
use crate::observability::StructuredLogger;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    hostname: String,
    snapshot: NodeMetricSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClusterRecord {
    application: ApplicationId,
    cluster: ClusterId,
    snapshot: ClusterMetricSnapshot,
}

/// The file backing one table
#[derive(Debug)]
struct TableFile {
    name: &'static str,
    path: PathBuf,
}

impl TableFile {
    fn new(directory: &Path, name: &'static str) -> Self {
        Self {
            name,
            path: directory.join(format!("{name}.jsonl")),
        }
    }

    fn io_error(&self, source: std::io::Error) -> MetricsDbError {
        MetricsDbError::Io {
            table: self.name.to_string(),
            source,
        }
    }

    /// Reads every record. A missing file is an empty table.
    fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, MetricsDbError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| MetricsDbError::Corrupt {
                table: self.name.to_string(),
                reason: format!("line {}: {}", number + 1, e),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| MetricsDbError::Corrupt {
                table: self.name.to_string(),
                reason: format!("line {}: {}", number + 1, e),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn append<T: Serialize>(&self, records: &[T]) -> Result<(), MetricsDbError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(&buffer).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Replaces the file contents via a temp file and rename
    fn rewrite<T: Serialize>(&self, records: impl Iterator<Item = T>) -> Result<(), MetricsDbError> {
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(&buffer).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Removes the file and makes sure the directory exists again
    fn wipe(&self) -> Result<(), MetricsDbError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    /// Recreates the store directory if something removed it
    fn wipe_if_missing_directory(&self) -> Result<(), MetricsDbError> {
        match self.path.parent() {
            Some(parent) if !parent.exists() => self.wipe(),
            _ => Ok(()),
        }
    }
}

struct NodeStore {
    table: NodeTable,
    file: TableFile,
}

impl NodeStore {
    fn records(&self) -> impl Iterator<Item = NodeRecord> + '_ {
        self.table.records().map(|(hostname, snapshot)| NodeRecord {
            hostname: hostname.clone(),
            snapshot: *snapshot,
        })
    }
}

struct ClusterStore {
    table: ClusterTable,
    file: TableFile,
}

impl ClusterStore {
    fn records(&self) -> impl Iterator<Item = ClusterRecord> + '_ {
        self.table
            .records()
            .map(|(application, cluster, snapshot)| ClusterRecord {
                application: application.clone(),
                cluster: cluster.clone(),
                snapshot: *snapshot,
            })
    }
}

/// A metrics store persisted as JSON-lines files
pub struct FileMetricsDb {
    directory: PathBuf,
    clock: Arc<dyn Clock>,
    retention: Duration,
    nodes: Mutex<NodeStore>,
    clusters: Mutex<ClusterStore>,
    logger: StructuredLogger,
}

impl FileMetricsDb {
    /// Opens the store in `directory`, creating it if needed. Corrupt table
    /// files are wiped and the table starts empty.
    pub fn open(directory: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, MetricsDbError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|source| MetricsDbError::Io {
            table: NODE_TABLE.to_string(),
            source,
        })?;
        let logger = StructuredLogger::new("metrics_db");

        let node_file = TableFile::new(&directory, NODE_TABLE);
        let mut node_table = NodeTable::default();
        for record in load_or_wipe::<NodeRecord>(&node_file, &logger)? {
            node_table.restore(record.hostname, record.snapshot);
        }

        let cluster_file = TableFile::new(&directory, CLUSTER_TABLE);
        let mut cluster_table = ClusterTable::default();
        for record in load_or_wipe::<ClusterRecord>(&cluster_file, &logger)? {
            cluster_table.restore(record.application, record.cluster, record.snapshot);
        }

        info!(
            path = %directory.display(),
            node_snapshots = node_table.len(),
            cluster_snapshots = cluster_table.len(),
            "Opened metrics db"
        );

        Ok(Self {
            directory,
            clock,
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            nodes: Mutex::new(NodeStore {
                table: node_table,
                file: node_file,
            }),
            clusters: Mutex::new(ClusterStore {
                table: cluster_table,
                file: cluster_file,
            }),
            logger,
        })
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

fn load_or_wipe<T: DeserializeOwned>(
    file: &TableFile,
    logger: &StructuredLogger,
) -> Result<Vec<T>, MetricsDbError> {
    match file.load() {
        Ok(records) => Ok(records),
        Err(e) if e.is_recoverable() => {
            warn!(table = file.name, error = %e, "Metrics table unreadable, wiping it");
            file.wipe()?;
            logger.log_metrics_db_repaired(file.name, &e.to_string());
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Appends `records`. On a recoverable failure the file is wiped and rewritten
/// from `all_records`, which must include `records`. A second failure is fatal.
fn append_or_repair<T: Serialize, I: Iterator<Item = T>>(
    file: &TableFile,
    logger: &StructuredLogger,
    records: &[T],
    all_records: impl FnOnce() -> I,
) -> Result<(), MetricsDbError> {
    match file.append(records) {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable() => {
            warn!(table = file.name, error = %e, "Metrics table write failed, repairing it");
            let repaired = file.wipe().and_then(|_| file.rewrite(all_records()));
            match repaired {
                Ok(()) => {
                    logger.log_metrics_db_repaired(file.name, &e.to_string());
                    Ok(())
                }
                Err(retry_error) => Err(MetricsDbError::Fatal {
                    table: file.name.to_string(),
                    reason: format!("{e}; after repair: {retry_error}"),
                }),
            }
        }
        Err(e) => Err(e),
    }
}

impl MetricsDb for FileMetricsDb {
    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn add_node_metrics(&self, snapshots: Vec<(String, NodeMetricSnapshot)>) -> Result<(), MetricsDbError> {
        let mut store = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
        let mut accepted = Vec::with_capacity(snapshots.len());
        for (hostname, snapshot) in snapshots {
            if store.table.insert(hostname.clone(), snapshot) {
                accepted.push(NodeRecord { hostname, snapshot });
            }
        }
        let store = &*store;
        append_or_repair(&store.file, &self.logger, &accepted, || store.records())?;
        debug!(snapshots = accepted.len(), "Stored node metrics");
        Ok(())
    }

    fn add_cluster_metrics(
        &self,
        application: &ApplicationId,
        snapshots: HashMap<ClusterId, ClusterMetricSnapshot>,
    ) -> Result<(), MetricsDbError> {
        let mut store = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
        let mut accepted = Vec::with_capacity(snapshots.len());
        for (cluster, snapshot) in snapshots {
            if store.table.insert(application.clone(), cluster.clone(), snapshot) {
                accepted.push(ClusterRecord {
                    application: application.clone(),
                    cluster,
                    snapshot,
                });
            }
        }
        let store = &*store;
        append_or_repair(&store.file, &self.logger, &accepted, || store.records())
    }

    fn node_timeseries(&self, period: Duration, hostnames: &[String]) -> Result<Vec<NodeTimeseries>, MetricsDbError> {
        let oldest = self.clock.now() - period;
        let store = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
        Ok(store.table.read(hostnames, oldest))
    }

    fn cluster_timeseries(
        &self,
        application: &ApplicationId,
        cluster: &ClusterId,
    ) -> Result<ClusterTimeseries, MetricsDbError> {
        let store = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
        Ok(store.table.read(application, cluster))
    }

    fn gc(&self) -> Result<(), MetricsDbError> {
        let oldest = self.clock.now() - self.retention;
        {
            let mut store = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
            store.table.gc(oldest);
            store.file.wipe_if_missing_directory()?;
            store.file.rewrite(store.records())?;
        }
        {
            let mut store = self
                .clusters
                .lock()
                .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
            store.table.gc(oldest);
            store.file.wipe_if_missing_directory()?;
            store.file.rewrite(store.records())?;
        }
        debug!(oldest = %oldest, "Garbage collected metrics db");
        Ok(())
    }

    fn close(&self) -> Result<(), MetricsDbError> {
        let nodes = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
        nodes.file.wipe_if_missing_directory()?;
        nodes.file.rewrite(nodes.records())?;
        let clusters = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
        clusters.file.wipe_if_missing_directory()?;
        clusters.file.rewrite(clusters.records())?;
        info!(path = %self.directory.display(), "Closed metrics db");
        Ok(())
    }

    fn stats(&self) -> Result<MetricsDbStats, MetricsDbError> {
        let node_snapshots = self
            .nodes
            .lock()
            .map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?
            .table
            .len();
        let cluster_snapshots = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?
            .table
            .len();
        Ok(MetricsDbStats {
            node_snapshots,
            cluster_snapshots,
        })
    }
}

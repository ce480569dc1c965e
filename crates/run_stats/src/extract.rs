use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StatsError;
use crate::store::{ResultFile, Snapshot, StatsLayout};

/// Identifies what a metric slot of a [`RunRecord`] holds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKey {
    /// Counter from the shared cache record at index 0
    Shared(String),
    /// Counter summed over the per-core private cache records
    Private(String),
    /// Mean cycles over the active cores
    AverageCycles,
    /// Fourth element of the time array
    TimeBound,
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Shared(name) => write!(f, "shared.{}", name),
            MetricKey::Private(name) => write!(f, "private.{}", name),
            MetricKey::AverageCycles => write!(f, "avg_cycles"),
            MetricKey::TimeBound => write!(f, "time_bound"),
        }
    }
}

/// Which metrics to pull out of every result file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractRequest {
    pub shared_fields: Vec<String>,
    pub private_fields: Vec<String>,
    pub include_cycle_metrics: bool,
    pub layout: StatsLayout,
}

impl ExtractRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shared_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_private_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.private_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cycle_metrics(mut self, include: bool) -> Self {
        self.include_cycle_metrics = include;
        self
    }

    pub fn with_layout(mut self, layout: StatsLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Keys of the metric slots every record carries, in slot order
    pub fn metric_keys(&self) -> Vec<MetricKey> {
        let mut keys: Vec<MetricKey> = self
            .shared_fields
            .iter()
            .map(|name| MetricKey::Shared(name.clone()))
            .chain(
                self.private_fields
                    .iter()
                    .map(|name| MetricKey::Private(name.clone())),
            )
            .collect();
        if self.include_cycle_metrics {
            keys.push(MetricKey::AverageCycles);
            keys.push(MetricKey::TimeBound);
        }
        keys
    }

    pub fn metric_count(&self) -> usize {
        self.shared_fields.len()
            + self.private_fields.len()
            + if self.include_cycle_metrics { 2 } else { 0 }
    }
}

/// Metrics of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Cores that were active during the run
    pub core_count: usize,
    /// One value per requested metric, in [`ExtractRequest::metric_keys`] order
    pub metrics: Vec<f64>,
    /// Result file the record was extracted from
    pub path: PathBuf,
}

impl RunRecord {
    pub fn new(core_count: usize, metrics: Vec<f64>, path: impl Into<PathBuf>) -> Self {
        Self {
            core_count,
            metrics,
            path: path.into(),
        }
    }

    /// Builds the record for `snapshot`. Counters the snapshot lacks become 0.
    pub fn from_snapshot(snapshot: &Snapshot, request: &ExtractRequest, path: &Path) -> Self {
        let mut metrics = Vec::with_capacity(request.metric_count());

        for name in &request.shared_fields {
            metrics.push(snapshot.shared_counter(name).unwrap_or_else(|| {
                log::debug!("{}: shared counter {} not found, using 0", path.display(), name);
                0.0
            }));
        }

        for name in &request.private_fields {
            metrics.push(snapshot.private_counter_sum(name).unwrap_or_else(|| {
                log::debug!("{}: private counter {} not found, using 0", path.display(), name);
                0.0
            }));
        }

        if request.include_cycle_metrics {
            metrics.push(snapshot.average_active_cycles());
            metrics.push(snapshot.time_bound().unwrap_or_else(|| {
                log::debug!("{}: no time bound recorded, using 0", path.display());
                0.0
            }));
        }

        Self::new(snapshot.core_count(), metrics, path)
    }
}

/// Extracts one record from a single result file
pub fn extract_file(path: &Path, request: &ExtractRequest) -> Result<RunRecord, StatsError> {
    let snapshot = ResultFile::open(path, &request.layout)?.last_snapshot()?;
    let record = RunRecord::from_snapshot(&snapshot, request, path);
    log::debug!(
        "{}: {} active cores of {}",
        path.display(),
        record.core_count,
        snapshot.core_cycles.len()
    );
    Ok(record)
}

/// Extracts one record per entry of `directory`, in directory-listing order.
///
/// Every entry is treated as a result file; the first one that cannot be read
/// aborts the whole extraction.
pub fn extract(directory: &Path, request: &ExtractRequest) -> Result<Vec<RunRecord>, StatsError> {
    if !directory.exists() {
        return Err(StatsError::InputNotFound(directory.to_path_buf()));
    }

    let entries = fs::read_dir(directory).map_err(|e| StatsError::io(directory, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StatsError::io(directory, e))?;
        paths.push(entry.path());
    }
    log::info!("{}: {} result files", directory.display(), paths.len());

    paths
        .iter()
        .map(|path| extract_file(path, request))
        .collect()
}

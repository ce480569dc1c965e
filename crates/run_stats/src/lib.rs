//! # run_stats
//!
//! Extraction and alignment of per-run simulator statistics.
//!
//! Each simulation run leaves one result store on disk holding a sequence of
//! snapshots of its counters. This crate reads the last snapshot of every run in
//! a directory, turns it into a [`RunRecord`] (active core count plus the
//! requested counters), and lines up the runs of two configurations by core
//! count so they can be compared point by point.
//!
//! Result stores are simulator HDF5 dumps (with the `hdf5` feature) or Parquet
//! files; in both the stats root is found under `stats.root` by default.
//!
//! ```no_run
//! use std::path::Path;
//! use run_stats::{align, extract, Comparison, ExtractRequest, FieldLabels};
//!
//! let request = ExtractRequest::new()
//!     .with_shared_fields(["mGETXIM"])
//!     .with_cycle_metrics(true);
//!
//! let coup = align(extract(Path::new("stats/coup"), &request)?);
//! let regular = align(extract(Path::new("stats/regular"), &request)?);
//! let comparison = Comparison::pair(request.metric_keys(), coup, regular)?;
//!
//! for series in comparison.all_series(&FieldLabels::default()) {
//!     println!("{}: {:?}", series.label, series.ratio());
//! }
//! # Ok::<(), run_stats::StatsError>(())
//! ```

pub mod align;
pub mod compare;
pub mod error;
pub mod extract;
#[cfg(feature = "hdf5")]
mod hdf5_store;
pub mod labels;
pub mod store;

#[cfg(test)]
mod test_support;

pub use align::{align, verify_core_counts, AlignedSeries};
pub use compare::{Comparison, MetricSeries};
pub use error::StatsError;
pub use extract::{extract, extract_file, ExtractRequest, MetricKey, RunRecord};
pub use labels::{parse_label_override, FieldLabels, DEFAULT_LABELS};
pub use store::{CounterRecord, ResultFile, Snapshot, StatsLayout};

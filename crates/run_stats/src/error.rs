use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an extraction or a comparison.
///
/// Counters that are merely absent from a result file never surface here; they
/// resolve to zero where they are looked up.
#[derive(Error, Debug)]
pub enum StatsError {
    /// A supplied input directory does not exist
    #[error("{} was not recognized as a path", .0.display())]
    InputNotFound(PathBuf),

    /// Listing a directory or opening a file failed
    #[error("I/O error on {}: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// The file could not be read as a result store in the expected layout
    #[error("malformed result file {}: {reason}", path.display())]
    MalformedResultFile { path: PathBuf, reason: String },

    /// The result store holds no snapshots, so there is no last snapshot to use
    #[error("result file {} contains no snapshots", .0.display())]
    EmptySnapshots(PathBuf),

    /// A run record does not carry one value per requested metric
    #[error("run {} has {found} metrics, expected {expected}", path.display())]
    MetricCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// The sorted core counts of the two configurations do not line up
    #[error("core counts differ between configurations: coup={coup:?}, regular={regular:?}")]
    CoreCountMismatch {
        coup: Vec<usize>,
        regular: Vec<usize>,
    },
}

impl StatsError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StatsError::MalformedResultFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StatsError::Io {
            path: path.into(),
            err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = StatsError::InputNotFound(PathBuf::from("/no/such/dir"));
        assert_eq!(err.to_string(), "/no/such/dir was not recognized as a path");

        let err = StatsError::malformed("/tmp/run.parquet", "wimpy column not found");
        assert_eq!(
            err.to_string(),
            "malformed result file /tmp/run.parquet: wimpy column not found"
        );
    }

    #[test]
    fn test_core_count_mismatch_lists_both_sides() {
        let err = StatsError::CoreCountMismatch {
            coup: vec![2, 4],
            regular: vec![2, 4, 8],
        };
        assert_eq!(
            err.to_string(),
            "core counts differ between configurations: coup=[2, 4], regular=[2, 4, 8]"
        );
    }
}

use crate::error::StatsError;
use crate::extract::RunRecord;

/// Run records of one configuration, sorted by core count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedSeries {
    core_counts: Vec<usize>,
    records: Vec<RunRecord>,
}

/// Sorts `records` by core count.
///
/// The sort is stable: runs with equal core counts keep their directory-listing
/// order, since nothing else in a record can break the tie.
pub fn align(mut records: Vec<RunRecord>) -> AlignedSeries {
    records.sort_by_key(|record| record.core_count);
    let core_counts = records.iter().map(|record| record.core_count).collect();
    AlignedSeries {
        core_counts,
        records,
    }
}

impl AlignedSeries {
    pub fn core_counts(&self) -> &[usize] {
        &self.core_counts
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RunRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of metric slot `index` across the series, `None` if any record
    /// lacks the slot
    pub fn metric(&self, index: usize) -> Option<Vec<f64>> {
        self.records
            .iter()
            .map(|record| record.metrics.get(index).copied())
            .collect()
    }

    /// Fails unless every record carries exactly `expected` metrics
    pub fn check_metric_count(&self, expected: usize) -> Result<(), StatsError> {
        match self
            .records
            .iter()
            .find(|record| record.metrics.len() != expected)
        {
            Some(record) => Err(StatsError::MetricCountMismatch {
                path: record.path.clone(),
                expected,
                found: record.metrics.len(),
            }),
            None => Ok(()),
        }
    }
}

/// Fails unless both configurations ran the same core counts, in the same order
pub fn verify_core_counts(
    coup: &AlignedSeries,
    regular: &AlignedSeries,
) -> Result<(), StatsError> {
    if coup.core_counts != regular.core_counts {
        return Err(StatsError::CoreCountMismatch {
            coup: coup.core_counts.clone(),
            regular: regular.core_counts.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(core_count: usize, tag: f64) -> RunRecord {
        RunRecord::new(core_count, vec![tag], format!("run_{}", tag))
    }

    #[test]
    fn test_sorts_by_core_count() {
        let series = align(vec![record(8, 0.0), record(2, 1.0), record(4, 2.0)]);
        assert_eq!(series.core_counts(), &[2, 4, 8]);
        assert_eq!(series.metric(0), Some(vec![1.0, 2.0, 0.0]));
        for (count, record) in series.core_counts().iter().zip(series.records()) {
            assert_eq!(*count, record.core_count);
        }
    }

    #[test]
    fn test_ties_keep_listing_order() {
        let series = align(vec![
            record(4, 0.0),
            record(2, 1.0),
            record(4, 2.0),
            record(2, 3.0),
            record(4, 4.0),
        ]);
        assert_eq!(series.core_counts(), &[2, 2, 4, 4, 4]);
        assert_eq!(series.metric(0), Some(vec![1.0, 3.0, 0.0, 2.0, 4.0]));
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![record(1, 0.0)])]
    #[case(vec![record(16, 0.0), record(1, 1.0), record(16, 2.0), record(8, 3.0)])]
    fn test_align_is_idempotent(#[case] records: Vec<RunRecord>) {
        let once = align(records);
        let twice = align(once.clone().into_records());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_metric_slot_out_of_range() {
        let series = align(vec![record(2, 0.0)]);
        assert_eq!(series.metric(1), None);
    }

    #[test]
    fn test_check_metric_count() {
        let series = align(vec![
            record(2, 0.0),
            RunRecord::new(4, vec![1.0, 2.0], "wide"),
        ]);
        assert!(series.check_metric_count(1).is_err());

        match series.check_metric_count(1) {
            Err(StatsError::MetricCountMismatch {
                path,
                expected,
                found,
            }) => {
                assert_eq!(path.to_str(), Some("wide"));
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("Expected MetricCountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_core_counts() {
        let coup = align(vec![record(4, 0.0), record(2, 1.0)]);
        let regular = align(vec![record(2, 2.0), record(4, 3.0)]);
        assert!(verify_core_counts(&coup, &regular).is_ok());
    }

    #[rstest]
    #[case(vec![2, 4, 8], vec![2, 4])]
    #[case(vec![2, 4, 8], vec![2, 4, 16])]
    #[case(vec![], vec![1])]
    fn test_mismatched_core_counts(#[case] coup: Vec<usize>, #[case] regular: Vec<usize>) {
        let coup = align(coup.into_iter().map(|c| record(c, 0.0)).collect());
        let regular = align(regular.into_iter().map(|c| record(c, 0.0)).collect());

        let result = verify_core_counts(&coup, &regular);
        if let Err(StatsError::CoreCountMismatch {
            coup: c,
            regular: r,
        }) = result
        {
            assert_eq!(c, coup.core_counts());
            assert_eq!(r, regular.core_counts());
        } else {
            panic!("Expected CoreCountMismatch error");
        }
    }
}

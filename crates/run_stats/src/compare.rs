use crate::align::{verify_core_counts, AlignedSeries};
use crate::error::StatsError;
use crate::extract::MetricKey;
use crate::labels::FieldLabels;

/// One metric of both configurations over the shared core counts
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub key: MetricKey,
    pub label: String,
    pub core_counts: Vec<usize>,
    pub coup: Vec<f64>,
    pub regular: Vec<f64>,
}

impl MetricSeries {
    /// `coup / regular` per core count; `None` where the regular value is 0
    pub fn ratio(&self) -> Vec<Option<f64>> {
        self.coup
            .iter()
            .zip(&self.regular)
            .map(|(&coup, &regular)| {
                if regular == 0.0 {
                    None
                } else {
                    Some(coup / regular)
                }
            })
            .collect()
    }
}

/// Coup and regular runs paired by core count
#[derive(Debug, Clone)]
pub struct Comparison {
    keys: Vec<MetricKey>,
    coup: AlignedSeries,
    regular: AlignedSeries,
    coup_scale: f64,
}

impl Comparison {
    /// Pairs the two configurations.
    ///
    /// Both must have run the same sorted core counts and every record must
    /// carry one value per key.
    pub fn pair(
        keys: Vec<MetricKey>,
        coup: AlignedSeries,
        regular: AlignedSeries,
    ) -> Result<Self, StatsError> {
        verify_core_counts(&coup, &regular)?;
        coup.check_metric_count(keys.len())?;
        regular.check_metric_count(keys.len())?;

        Ok(Self {
            keys,
            coup,
            regular,
            coup_scale: 1.0,
        })
    }

    /// Multiplies every coup value by `scale` before comparing
    pub fn with_coup_scale(mut self, scale: f64) -> Self {
        self.coup_scale = scale;
        self
    }

    pub fn core_counts(&self) -> &[usize] {
        self.coup.core_counts()
    }

    pub fn metric_keys(&self) -> &[MetricKey] {
        &self.keys
    }

    pub fn coup(&self) -> &AlignedSeries {
        &self.coup
    }

    pub fn regular(&self) -> &AlignedSeries {
        &self.regular
    }

    /// Series of metric slot `index`
    pub fn series(&self, index: usize, labels: &FieldLabels) -> Option<MetricSeries> {
        let key = self.keys.get(index)?.clone();
        let coup = self
            .coup
            .metric(index)?
            .into_iter()
            .map(|value| value * self.coup_scale)
            .collect();
        let regular = self.regular.metric(index)?;

        Some(MetricSeries {
            label: labels.metric_label(&key),
            key,
            core_counts: self.core_counts().to_vec(),
            coup,
            regular,
        })
    }

    /// Series of the slot holding `key`
    pub fn series_for(&self, key: &MetricKey, labels: &FieldLabels) -> Option<MetricSeries> {
        let index = self.keys.iter().position(|k| k == key)?;
        self.series(index, labels)
    }

    /// Every metric series, in slot order
    pub fn all_series(&self, labels: &FieldLabels) -> Vec<MetricSeries> {
        (0..self.keys.len())
            .filter_map(|index| self.series(index, labels))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align;
    use crate::extract::RunRecord;

    fn series(runs: &[(usize, f64, f64)]) -> AlignedSeries {
        align(
            runs.iter()
                .map(|&(cores, a, b)| RunRecord::new(cores, vec![a, b], "run"))
                .collect(),
        )
    }

    fn keys() -> Vec<MetricKey> {
        vec![MetricKey::Shared("hGETX".into()), MetricKey::AverageCycles]
    }

    #[test]
    fn test_pair_and_read_series() {
        let coup = series(&[(4, 20.0, 400.0), (2, 10.0, 200.0)]);
        let regular = series(&[(2, 5.0, 100.0), (4, 40.0, 400.0)]);
        let comparison = Comparison::pair(keys(), coup, regular).unwrap();

        let hits = comparison.series(0, &FieldLabels::default()).unwrap();
        assert_eq!(hits.label, "L2 GETX hits");
        assert_eq!(hits.core_counts, vec![2, 4]);
        assert_eq!(hits.coup, vec![10.0, 20.0]);
        assert_eq!(hits.regular, vec![5.0, 40.0]);
        assert_eq!(hits.ratio(), vec![Some(2.0), Some(0.5)]);

        let cycles = comparison
            .series_for(&MetricKey::AverageCycles, &FieldLabels::default())
            .unwrap();
        assert_eq!(cycles.ratio(), vec![Some(2.0), Some(1.0)]);

        assert_eq!(comparison.all_series(&FieldLabels::default()).len(), 2);
        assert!(comparison.series(2, &FieldLabels::default()).is_none());
    }

    #[test]
    fn test_identical_cycles_give_unit_ratio() {
        let runs = [(2, 1.0, 350.0), (8, 1.0, 910.5), (4, 1.0, 512.0)];
        let comparison = Comparison::pair(keys(), series(&runs), series(&runs)).unwrap();

        let cycles = comparison
            .series_for(&MetricKey::AverageCycles, &FieldLabels::default())
            .unwrap();
        assert_eq!(cycles.ratio(), vec![Some(1.0); 3]);
    }

    #[test]
    fn test_zero_regular_has_no_ratio() {
        let comparison = Comparison::pair(
            keys(),
            series(&[(2, 3.0, 1.0)]),
            series(&[(2, 0.0, 1.0)]),
        )
        .unwrap();
        let hits = comparison.series(0, &FieldLabels::default()).unwrap();
        assert_eq!(hits.ratio(), vec![None]);
    }

    #[test]
    fn test_coup_scale() {
        let comparison = Comparison::pair(
            keys(),
            series(&[(2, 10.0, 1.0)]),
            series(&[(2, 10.0, 1.0)]),
        )
        .unwrap()
        .with_coup_scale(0.5);

        let hits = comparison.series(0, &FieldLabels::default()).unwrap();
        assert_eq!(hits.coup, vec![5.0]);
        assert_eq!(hits.regular, vec![10.0]);
    }

    #[test]
    fn test_pair_rejects_mismatched_core_counts() {
        let result = Comparison::pair(
            keys(),
            series(&[(2, 0.0, 0.0), (4, 0.0, 0.0)]),
            series(&[(2, 0.0, 0.0), (8, 0.0, 0.0)]),
        );
        assert!(matches!(
            result,
            Err(StatsError::CoreCountMismatch { .. })
        ));
    }

    #[test]
    fn test_pair_rejects_wrong_metric_count() {
        let result = Comparison::pair(
            vec![MetricKey::TimeBound],
            series(&[(2, 0.0, 0.0)]),
            series(&[(2, 0.0, 0.0)]),
        );
        assert!(matches!(
            result,
            Err(StatsError::MetricCountMismatch { expected: 1, found: 2, .. })
        ));
    }
}

use std::collections::BTreeMap;

use crate::extract::MetricKey;

/// Display labels of the coherence counters the cache models dump
pub const DEFAULT_LABELS: [(&str, &str); 5] = [
    ("hGETX", "GETX hits"),
    ("mGETXIM", "GETX I->M misses"),
    ("mGETXSM", "S->M misses (upgrade misses)"),
    ("PUTX", "Dirty evictions (from lower level)"),
    ("INVX", "Downgrades (from upper level)"),
];

/// Maps counter names to display labels. Unknown names label themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLabels {
    labels: BTreeMap<String, String>,
}

impl Default for FieldLabels {
    fn default() -> Self {
        DEFAULT_LABELS.into_iter().collect()
    }
}

impl<N: Into<String>, L: Into<String>> FromIterator<(N, L)> for FieldLabels {
    fn from_iter<I: IntoIterator<Item = (N, L)>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|(name, label)| (name.into(), label.into()))
                .collect(),
        }
    }
}

impl FieldLabels {
    /// An empty mapping; every counter is labelled with its own name
    pub fn empty() -> Self {
        Self {
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(name.into(), label.into());
        self
    }

    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.labels.get(name).map_or(name, String::as_str)
    }

    /// Label for a metric slot, prefixed with its cache level
    pub fn metric_label(&self, key: &MetricKey) -> String {
        match key {
            MetricKey::Shared(name) => format!("L2 {}", self.label(name)),
            MetricKey::Private(name) => format!("L1 {}", self.label(name)),
            MetricKey::AverageCycles => "Average cycles (used cores)".to_string(),
            MetricKey::TimeBound => "Time bound".to_string(),
        }
    }
}

/// Parses a `name=label` override
pub fn parse_label_override(arg: &str) -> Option<(String, String)> {
    let (name, label) = arg.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), label.trim().to_string()))
}

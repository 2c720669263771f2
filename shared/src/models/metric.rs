//! Metric data model.
//!
//! Defines `MetricFamily`, a named and typed group of series, together with the
//! label and value types each metric kind carries. A family's kind is fixed by
//! the constructor that created it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Default histogram bucket bounds, in seconds.
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Label name reserved for histogram bucket bounds.
const BUCKET_LABEL: &str = "le";

/// Kind of metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A monotonic accumulator (e.g., transactions processed).
    Counter,
    /// A point value that can go up or down (e.g., active validators).
    Gauge,
    /// A bucketed distribution of observations (e.g., processing latency).
    Histogram,
    /// A static key/value label payload, always exposed with value 1.
    Info,
    /// Exactly one active state out of a fixed, ordered state set.
    Enum,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
            Self::Info => write!(f, "info"),
            Self::Enum => write!(f, "enum"),
        }
    }
}

/// Errors raised while building metric families and samples.
///
/// These are programmer errors in the fixture, never runtime conditions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSample {
    /// A counter was asked to go down.
    #[error("Negative increment {amount} for counter '{family}'")]
    NegativeIncrement {
        /// Family name.
        family: String,
        /// The rejected increment.
        amount: f64,
    },

    /// The value is NaN, or infinite where only finite values make sense.
    #[error("Invalid value {value} for family '{family}'")]
    InvalidValue {
        /// Family name.
        family: String,
        /// The rejected value.
        value: f64,
    },

    /// A family with the same name is already part of the collection.
    #[error("Metric family '{0}' is already registered")]
    DuplicateFamily(String),

    /// A series with the same label set already exists in the family.
    #[error("Label set {labels} already exists in family '{family}'")]
    DuplicateLabelSet {
        /// Family name.
        family: String,
        /// Rendered label set.
        labels: String,
    },

    /// The metric name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    #[error("Invalid metric name: '{0}'")]
    InvalidMetricName(String),

    /// The label name is malformed or reserved.
    #[error("Invalid label name: '{0}'")]
    InvalidLabelName(String),

    /// The same label name was given twice.
    #[error("Label '{0}' given more than once")]
    DuplicateLabelName(String),

    /// The sample's label names differ from the family's declared ones.
    #[error("Family '{family}' expects labels {expected:?}, got {got:?}")]
    LabelMismatch {
        /// Family name.
        family: String,
        /// Declared label names.
        expected: Vec<String>,
        /// Supplied label names.
        got: Vec<String>,
    },

    /// The operation does not apply to the family's kind.
    #[error("Family '{family}' is a {actual}, not a {expected}")]
    KindMismatch {
        /// Family name.
        family: String,
        /// Kind the operation needs.
        expected: MetricKind,
        /// Kind of the family.
        actual: MetricKind,
    },

    /// Histogram bounds are empty, non-finite, or not strictly ascending.
    #[error("Histogram '{0}' needs a non-empty, finite, strictly ascending bucket list")]
    InvalidBuckets(String),

    /// Enum state list is empty or has duplicates.
    #[error("Enum '{0}' needs a non-empty list of distinct states")]
    InvalidStates(String),

    /// The requested enum state was not declared.
    #[error("Enum '{family}' has no state '{state}'")]
    UnknownState {
        /// Family name.
        family: String,
        /// The rejected state.
        state: String,
    },

    /// Cumulative bucket counts decrease somewhere in a histogram series.
    #[error("Histogram '{family}' has decreasing bucket counts for {labels}")]
    NonMonotonicBuckets {
        /// Family name.
        family: String,
        /// Rendered label set.
        labels: String,
    },
}

/// Returns true if `name` is a valid metric name.
#[must_use]
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Returns true if `name` is a valid, non-reserved label name.
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An immutable set of label name/value pairs identifying one series.
///
/// Equality ignores the order the pairs were supplied in; iteration is in
/// ascending label-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a label set from name/value pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is malformed or given twice.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, InvalidSample>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, value) in pairs {
            let name = name.into();
            if !is_valid_label_name(&name) {
                return Err(InvalidSample::InvalidLabelName(name));
            }
            if map.contains_key(&name) {
                return Err(InvalidSample::DuplicateLabelName(name));
            }
            map.insert(name, value.into());
        }
        Ok(Self(map))
    }

    /// Looks up the value of a label.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over label names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}=\"{value}\"")?;
        }
        write!(f, "}}")
    }
}

/// One series of a family: its label set and kind-specific value.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    /// Labels identifying the series.
    pub labels: LabelSet,
    /// Current value.
    pub value: T,
}

/// Observations of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramState {
    /// Per-bucket (non-cumulative) counts, one per configured bound.
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramState {
    fn new(bucket_len: usize) -> Self {
        Self {
            bucket_counts: vec![0; bucket_len],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, bounds: &[f64], value: f64) {
        if let Some(idx) = bounds.iter().position(|bound| value <= *bound) {
            self.bucket_counts[idx] += 1;
        }
        self.sum += value;
        self.count += 1;
    }

    /// Sum of all observed values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Total number of observations, including those above the last bound.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Cumulative counts, one per configured bound.
    #[must_use]
    pub fn cumulative_counts(&self) -> Vec<u64> {
        self.bucket_counts
            .iter()
            .scan(0u64, |acc, n| {
                *acc += n;
                Some(*acc)
            })
            .collect()
    }
}

/// Kind-specific payload of a family.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyData {
    /// Running totals per series.
    Counter(Vec<Series<f64>>),
    /// Last-set values per series.
    Gauge(Vec<Series<f64>>),
    /// Bucketed observations per series.
    Histogram {
        /// Strictly ascending, finite upper bounds.
        bounds: Vec<f64>,
        /// Series in insertion order.
        series: Vec<Series<HistogramState>>,
    },
    /// Static label payload.
    Info(LabelSet),
    /// Declared states and the index of the active one.
    Enum {
        /// States in declaration order.
        states: Vec<String>,
        /// Index into `states`.
        active: usize,
    },
}

/// A named, typed group of series sharing a help string.
///
/// # Example
///
/// ```
/// use shared::models::MetricFamily;
///
/// let mut tx = MetricFamily::counter(
///     "sui_transactions_total",
///     "Total number of transactions processed",
///     &["transaction_type", "status"],
/// )
/// .unwrap();
///
/// tx.inc(&[("transaction_type", "transfer"), ("status", "success")], 1250.0)
///     .unwrap();
/// assert!(tx.inc(&[("transaction_type", "transfer"), ("status", "success")], -5.0).is_err());
/// assert_eq!(
///     tx.counter_value(&[("status", "success"), ("transaction_type", "transfer")]),
///     Some(1250.0)
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    name: String,
    help: String,
    label_names: Vec<String>,
    data: FamilyData,
}

impl MetricFamily {
    fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
        data: FamilyData,
    ) -> Result<Self, InvalidSample> {
        let name = name.into();
        if !is_valid_metric_name(&name) {
            return Err(InvalidSample::InvalidMetricName(name));
        }

        let mut declared: Vec<String> = Vec::with_capacity(label_names.len());
        for label in label_names {
            if !is_valid_label_name(label) {
                return Err(InvalidSample::InvalidLabelName((*label).to_string()));
            }
            if matches!(data, FamilyData::Histogram { .. }) && *label == BUCKET_LABEL {
                return Err(InvalidSample::InvalidLabelName((*label).to_string()));
            }
            if declared.iter().any(|d| d == label) {
                return Err(InvalidSample::DuplicateLabelName((*label).to_string()));
            }
            declared.push((*label).to_string());
        }

        Ok(Self {
            name,
            help: help.into(),
            label_names: declared,
            data,
        })
    }

    /// Creates a counter family.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or a label name is invalid.
    pub fn counter(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
    ) -> Result<Self, InvalidSample> {
        Self::new(name, help, label_names, FamilyData::Counter(Vec::new()))
    }

    /// Creates a gauge family.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or a label name is invalid.
    pub fn gauge(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
    ) -> Result<Self, InvalidSample> {
        Self::new(name, help, label_names, FamilyData::Gauge(Vec::new()))
    }

    /// Creates a histogram family with explicit bucket bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or a label name is invalid, if `le` is
    /// declared as a label, or if `bounds` is empty, non-finite, or not
    /// strictly ascending.
    pub fn histogram(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
        bounds: &[f64],
    ) -> Result<Self, InvalidSample> {
        let name = name.into();
        let ascending = bounds.windows(2).all(|w| w[0] < w[1]);
        if bounds.is_empty() || !ascending || bounds.iter().any(|b| !b.is_finite()) {
            return Err(InvalidSample::InvalidBuckets(name));
        }
        Self::new(
            name,
            help,
            label_names,
            FamilyData::Histogram {
                bounds: bounds.to_vec(),
                series: Vec::new(),
            },
        )
    }

    /// Creates an info family with an empty payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn info(name: impl Into<String>, help: impl Into<String>) -> Result<Self, InvalidSample> {
        Self::new(name, help, &[], FamilyData::Info(LabelSet::new()))
    }

    /// Creates an enum family. The first state is active until
    /// [`set_state`](Self::set_state) is called.
    ///
    /// The family name is also the label carrying the state, so it must be a
    /// valid label name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or `states` is empty or has
    /// duplicates.
    pub fn enumeration(
        name: impl Into<String>,
        help: impl Into<String>,
        states: &[&str],
    ) -> Result<Self, InvalidSample> {
        let name = name.into();
        if !is_valid_label_name(&name) {
            return Err(InvalidSample::InvalidLabelName(name));
        }
        let distinct = states
            .iter()
            .enumerate()
            .all(|(i, s)| !states[..i].contains(s));
        if states.is_empty() || !distinct {
            return Err(InvalidSample::InvalidStates(name));
        }
        Self::new(
            name,
            help,
            &[],
            FamilyData::Enum {
                states: states.iter().map(|s| (*s).to_string()).collect(),
                active: 0,
            },
        )
    }

    /// The family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The help string.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Label names every series must carry, in declaration order.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// The kind of this family.
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self.data {
            FamilyData::Counter(_) => MetricKind::Counter,
            FamilyData::Gauge(_) => MetricKind::Gauge,
            FamilyData::Histogram { .. } => MetricKind::Histogram,
            FamilyData::Info(_) => MetricKind::Info,
            FamilyData::Enum { .. } => MetricKind::Enum,
        }
    }

    /// The kind-specific payload.
    #[must_use]
    pub fn data(&self) -> &FamilyData {
        &self.data
    }

    /// Number of series. Info and enum families always have one.
    #[must_use]
    pub fn series_count(&self) -> usize {
        match &self.data {
            FamilyData::Counter(series) | FamilyData::Gauge(series) => series.len(),
            FamilyData::Histogram { series, .. } => series.len(),
            FamilyData::Info(_) | FamilyData::Enum { .. } => 1,
        }
    }

    /// Adds `amount` to a counter series, creating it at zero first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a counter, if `amount` is negative or
    /// not finite, or if the labels do not match the declared names. The
    /// running total is left untouched on error.
    pub fn inc(&mut self, labels: &[(&str, &str)], amount: f64) -> Result<(), InvalidSample> {
        self.expect_kind(MetricKind::Counter)?;
        if !amount.is_finite() {
            return Err(self.invalid_value(amount));
        }
        if amount < 0.0 {
            return Err(InvalidSample::NegativeIncrement {
                family: self.name.clone(),
                amount,
            });
        }
        let labels = self.resolve_labels(labels)?;
        if let FamilyData::Counter(series) = &mut self.data {
            *series_entry(series, labels, || 0.0) += amount;
        }
        Ok(())
    }

    /// Sets a gauge series, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a gauge, if `value` is NaN, or if the
    /// labels do not match the declared names.
    pub fn set(&mut self, labels: &[(&str, &str)], value: f64) -> Result<(), InvalidSample> {
        self.expect_kind(MetricKind::Gauge)?;
        if value.is_nan() {
            return Err(self.invalid_value(value));
        }
        let labels = self.resolve_labels(labels)?;
        if let FamilyData::Gauge(series) = &mut self.data {
            *series_entry(series, labels, || 0.0) = value;
        }
        Ok(())
    }

    /// Records one observation in a histogram series.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a histogram, if `value` is NaN, or if
    /// the labels do not match the declared names.
    pub fn observe(&mut self, labels: &[(&str, &str)], value: f64) -> Result<(), InvalidSample> {
        self.expect_kind(MetricKind::Histogram)?;
        if value.is_nan() {
            return Err(self.invalid_value(value));
        }
        let labels = self.resolve_labels(labels)?;
        if let FamilyData::Histogram { bounds, series } = &mut self.data {
            let bucket_len = bounds.len();
            series_entry(series, labels, || HistogramState::new(bucket_len)).observe(bounds, value);
        }
        Ok(())
    }

    /// Declares a series at its zero value so it is exported before its
    /// first update.
    ///
    /// # Errors
    ///
    /// Returns an error if the family is an info or enum, if the labels do
    /// not match, or if the series already exists.
    pub fn register_series(&mut self, labels: &[(&str, &str)]) -> Result<(), InvalidSample> {
        let kind = self.kind();
        if matches!(kind, MetricKind::Info | MetricKind::Enum) {
            return Err(InvalidSample::KindMismatch {
                family: self.name.clone(),
                expected: MetricKind::Counter,
                actual: kind,
            });
        }
        let labels = self.resolve_labels(labels)?;
        let exists = match &self.data {
            FamilyData::Counter(series) | FamilyData::Gauge(series) => {
                series.iter().any(|s| s.labels == labels)
            }
            FamilyData::Histogram { series, .. } => series.iter().any(|s| s.labels == labels),
            FamilyData::Info(_) | FamilyData::Enum { .. } => false,
        };
        if exists {
            return Err(InvalidSample::DuplicateLabelSet {
                family: self.name.clone(),
                labels: labels.to_string(),
            });
        }
        match &mut self.data {
            FamilyData::Counter(series) | FamilyData::Gauge(series) => {
                series.push(Series { labels, value: 0.0 });
            }
            FamilyData::Histogram { bounds, series } => series.push(Series {
                labels,
                value: HistogramState::new(bounds.len()),
            }),
            FamilyData::Info(_) | FamilyData::Enum { .. } => {}
        }
        Ok(())
    }

    /// Replaces the info payload.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not an info family or a label name is
    /// invalid.
    pub fn set_info(&mut self, pairs: &[(&str, &str)]) -> Result<(), InvalidSample> {
        self.expect_kind(MetricKind::Info)?;
        let payload = LabelSet::from_pairs(pairs.iter().copied())?;
        if let FamilyData::Info(current) = &mut self.data {
            *current = payload;
        }
        Ok(())
    }

    /// Activates `state`, deactivating whichever state was active before.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not an enum family or `state` was not
    /// declared.
    pub fn set_state(&mut self, state: &str) -> Result<(), InvalidSample> {
        self.expect_kind(MetricKind::Enum)?;
        let family = self.name.clone();
        if let FamilyData::Enum { states, active } = &mut self.data {
            *active = states
                .iter()
                .position(|s| s == state)
                .ok_or_else(|| InvalidSample::UnknownState {
                    family,
                    state: state.to_string(),
                })?;
        }
        Ok(())
    }

    /// The active state of an enum family, `None` for other kinds.
    #[must_use]
    pub fn active_state(&self) -> Option<&str> {
        match &self.data {
            FamilyData::Enum { states, active } => states.get(*active).map(String::as_str),
            _ => None,
        }
    }

    /// The info payload, `None` for other kinds.
    #[must_use]
    pub fn info_payload(&self) -> Option<&LabelSet> {
        match &self.data {
            FamilyData::Info(payload) => Some(payload),
            _ => None,
        }
    }

    /// Current total of a counter series.
    #[must_use]
    pub fn counter_value(&self, labels: &[(&str, &str)]) -> Option<f64> {
        match &self.data {
            FamilyData::Counter(series) => find_series(series, labels).copied(),
            _ => None,
        }
    }

    /// Current value of a gauge series.
    #[must_use]
    pub fn gauge_value(&self, labels: &[(&str, &str)]) -> Option<f64> {
        match &self.data {
            FamilyData::Gauge(series) => find_series(series, labels).copied(),
            _ => None,
        }
    }

    /// Observations of a histogram series.
    #[must_use]
    pub fn histogram_state(&self, labels: &[(&str, &str)]) -> Option<&HistogramState> {
        match &self.data {
            FamilyData::Histogram { series, .. } => find_series(series, labels),
            _ => None,
        }
    }

    /// Re-checks the structural invariants of the family.
    ///
    /// # Errors
    ///
    /// Returns an error if two series share a label set or a histogram's
    /// cumulative counts decrease or exceed its total count.
    pub fn validate(&self) -> Result<(), InvalidSample> {
        match &self.data {
            FamilyData::Counter(series) | FamilyData::Gauge(series) => {
                self.check_unique(series)?;
            }
            FamilyData::Histogram { series, .. } => {
                self.check_unique(series)?;
                for s in series {
                    let cumulative = s.value.cumulative_counts();
                    let monotonic = cumulative.windows(2).all(|w| w[0] <= w[1]);
                    let bounded = cumulative
                        .last()
                        .map_or(true, |last| *last <= s.value.count());
                    if !monotonic || !bounded {
                        return Err(InvalidSample::NonMonotonicBuckets {
                            family: self.name.clone(),
                            labels: s.labels.to_string(),
                        });
                    }
                }
            }
            FamilyData::Info(_) | FamilyData::Enum { .. } => {}
        }
        Ok(())
    }

    fn check_unique<T>(&self, series: &[Series<T>]) -> Result<(), InvalidSample> {
        for (i, s) in series.iter().enumerate() {
            if series[..i].iter().any(|other| other.labels == s.labels) {
                return Err(InvalidSample::DuplicateLabelSet {
                    family: self.name.clone(),
                    labels: s.labels.to_string(),
                });
            }
        }
        Ok(())
    }

    fn expect_kind(&self, expected: MetricKind) -> Result<(), InvalidSample> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(InvalidSample::KindMismatch {
                family: self.name.clone(),
                expected,
                actual,
            })
        }
    }

    fn invalid_value(&self, value: f64) -> InvalidSample {
        InvalidSample::InvalidValue {
            family: self.name.clone(),
            value,
        }
    }

    fn resolve_labels(&self, labels: &[(&str, &str)]) -> Result<LabelSet, InvalidSample> {
        let set = LabelSet::from_pairs(labels.iter().copied())?;
        let matches = set.len() == self.label_names.len()
            && self.label_names.iter().all(|n| set.get(n).is_some());
        if !matches {
            return Err(InvalidSample::LabelMismatch {
                family: self.name.clone(),
                expected: self.label_names.clone(),
                got: set.names().map(String::from).collect(),
            });
        }
        Ok(set)
    }
}

fn series_entry<T>(
    series: &mut Vec<Series<T>>,
    labels: LabelSet,
    init: impl FnOnce() -> T,
) -> &mut T {
    let idx = if let Some(idx) = series.iter().position(|s| s.labels == labels) {
        idx
    } else {
        series.push(Series {
            labels,
            value: init(),
        });
        series.len() - 1
    };
    &mut series[idx].value
}

fn find_series<'a, T>(series: &'a [Series<T>], labels: &[(&str, &str)]) -> Option<&'a T> {
    let wanted = LabelSet::from_pairs(labels.iter().copied()).ok()?;
    series.iter().find(|s| s.labels == wanted).map(|s| &s.value)
}

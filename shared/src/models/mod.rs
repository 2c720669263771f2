//! Data models for Pushprobe.
//!
//! This module contains the in-memory metric model: families, label sets,
//! and the collection that owns them for a single delivery attempt.

pub mod collection;
pub mod metric;

pub use collection::MetricCollection;
pub use metric::{
    is_valid_label_name, is_valid_metric_name, FamilyData, HistogramState, InvalidSample,
    LabelSet, MetricFamily, MetricKind, Series, DEFAULT_BUCKETS,
};

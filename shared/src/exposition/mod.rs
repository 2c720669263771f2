//! Binary exposition codec.
//!
//! Converts a [`MetricCollection`] into Prometheus `MetricFamily` protobuf
//! messages and writes them as a stream of varint length-delimited records,
//! the body format metric ingestion proxies expect for
//! `application/x-protobuf` pushes.
//!
//! Kinds without a native protobuf type follow the usual client convention:
//! info and enum families travel as gauges. An info family is one metric
//! carrying its payload labels with value 1; an enum family is one metric
//! per declared state, labelled `{<family>="<state>"}`, with value 1 for the
//! active state and 0 for the rest. Histograms list their explicit bounds
//! only; the `+Inf` bucket is implied by `sample_count`.
//!
//! # Example
//!
//! ```
//! use shared::exposition::{decode, serialize};
//! use shared::fixture;
//!
//! let collection = fixture::build().unwrap();
//! let payload = serialize(&collection);
//! let families = decode(&payload).unwrap();
//!
//! assert_eq!(families.len(), collection.len());
//! assert_eq!(families[0].name(), "sui_transactions_total");
//! ```

pub mod proto;

use crate::models::{FamilyData, LabelSet, MetricCollection, MetricFamily, MetricKind};
use prost::Message;

/// Content type of a serialized payload.
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// Protobuf type a metric kind is exposed as.
#[must_use]
pub fn wire_type(kind: MetricKind) -> proto::MetricType {
    match kind {
        MetricKind::Counter => proto::MetricType::Counter,
        MetricKind::Gauge | MetricKind::Info | MetricKind::Enum => proto::MetricType::Gauge,
        MetricKind::Histogram => proto::MetricType::Histogram,
    }
}

/// Converts every family of the collection, in registration order.
#[must_use]
pub fn to_wire(collection: &MetricCollection) -> Vec<proto::MetricFamily> {
    collection.families().iter().map(family_to_wire).collect()
}

/// Serializes the collection into a length-delimited protobuf stream.
///
/// Output depends only on the collection's contents: families in
/// registration order, series in insertion order, labels in name order.
#[must_use]
pub fn serialize(collection: &MetricCollection) -> Vec<u8> {
    let mut payload = Vec::new();
    for family in to_wire(collection) {
        payload.extend(family.encode_length_delimited_to_vec());
    }
    tracing::debug!(
        families = collection.len(),
        bytes = payload.len(),
        "Serialized metric collection"
    );
    payload
}

/// Parses a length-delimited protobuf stream back into families.
///
/// # Errors
///
/// Returns an error if a record is truncated or malformed.
pub fn decode(mut payload: &[u8]) -> Result<Vec<proto::MetricFamily>, prost::DecodeError> {
    let mut families = Vec::new();
    while !payload.is_empty() {
        families.push(proto::MetricFamily::decode_length_delimited(&mut payload)?);
    }
    Ok(families)
}

fn family_to_wire(family: &MetricFamily) -> proto::MetricFamily {
    let metric = match family.data() {
        FamilyData::Counter(series) => series
            .iter()
            .map(|s| proto::Metric {
                label: label_pairs(&s.labels),
                counter: Some(proto::Counter {
                    value: Some(s.value),
                }),
                ..Default::default()
            })
            .collect(),
        FamilyData::Gauge(series) => series
            .iter()
            .map(|s| gauge_metric(label_pairs(&s.labels), s.value))
            .collect(),
        FamilyData::Histogram { bounds, series } => series
            .iter()
            .map(|s| proto::Metric {
                label: label_pairs(&s.labels),
                histogram: Some(proto::Histogram {
                    sample_count: Some(s.value.count()),
                    sample_sum: Some(s.value.sum()),
                    bucket: bounds
                        .iter()
                        .zip(s.value.cumulative_counts())
                        .map(|(bound, cumulative)| proto::Bucket {
                            cumulative_count: Some(cumulative),
                            upper_bound: Some(*bound),
                        })
                        .collect(),
                }),
                ..Default::default()
            })
            .collect(),
        FamilyData::Info(payload) => vec![gauge_metric(label_pairs(payload), 1.0)],
        FamilyData::Enum { states, active } => states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                let label = vec![proto::LabelPair {
                    name: Some(family.name().to_string()),
                    value: Some(state.clone()),
                }];
                gauge_metric(label, if i == *active { 1.0 } else { 0.0 })
            })
            .collect(),
    };

    proto::MetricFamily {
        name: Some(family.name().to_string()),
        help: Some(family.help().to_string()),
        r#type: Some(wire_type(family.kind()) as i32),
        metric,
    }
}

fn gauge_metric(label: Vec<proto::LabelPair>, value: f64) -> proto::Metric {
    proto::Metric {
        label,
        gauge: Some(proto::Gauge { value: Some(value) }),
        ..Default::default()
    }
}

fn label_pairs(labels: &LabelSet) -> Vec<proto::LabelPair> {
    labels
        .iter()
        .map(|(name, value)| proto::LabelPair {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        })
        .collect()
}

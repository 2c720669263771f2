//! Sample metric fixture.
//!
//! Builds a self-contained collection that exercises every metric kind the
//! exposition format carries: labelled and unlabelled counters and gauges,
//! histograms with default and custom buckets, an info payload, and an enum.
//! The values are illustrative; only the shape is relied upon.

use crate::models::{InvalidSample, MetricCollection, MetricFamily, DEFAULT_BUCKETS};

/// Bucket bounds for gas usage per transaction.
pub const GAS_BUCKETS: [f64; 7] = [100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0];

/// States of the node status enum, in declaration order.
pub const NODE_STATES: [&str; 4] = ["starting", "syncing", "active", "error"];

/// Builds the sample node metrics.
///
/// # Errors
///
/// Only fails on a construction mistake in this function (for instance a
/// duplicate family name); a correct build never errors.
pub fn build() -> Result<MetricCollection, InvalidSample> {
    let mut collection = MetricCollection::new();

    let transactions = collection.register(MetricFamily::counter(
        "sui_transactions_total",
        "Total number of transactions processed",
        &["transaction_type", "status"],
    )?)?;
    for (transaction_type, status, count) in [
        ("transfer", "success", 1250.0),
        ("transfer", "failed", 15.0),
        ("publish", "success", 89.0),
        ("call", "success", 2340.0),
    ] {
        transactions.inc(
            &[("transaction_type", transaction_type), ("status", status)],
            count,
        )?;
    }

    collection
        .register(MetricFamily::gauge(
            "sui_active_validators",
            "Number of active validators",
            &[],
        )?)?
        .set(&[], 42.0)?;

    let block_processing = collection.register(MetricFamily::histogram(
        "sui_block_processing_seconds",
        "Time spent processing blocks",
        &["validator_name"],
        &DEFAULT_BUCKETS,
    )?)?;
    for (validator, seconds) in [
        ("validator-1", 0.5),
        ("validator-1", 1.2),
        ("validator-1", 0.8),
        ("validator-2", 0.7),
        ("validator-2", 0.9),
    ] {
        block_processing.observe(&[("validator_name", validator)], seconds)?;
    }

    collection
        .register(MetricFamily::gauge(
            "sui_network_tps",
            "Transactions per second",
            &[],
        )?)?
        .set(&[], 156.7)?;

    let rounds = collection.register(MetricFamily::counter(
        "sui_consensus_rounds_total",
        "Total consensus rounds",
        &["round_type"],
    )?)?;
    rounds.inc(&[("round_type", "normal")], 5678.0)?;
    rounds.inc(&[("round_type", "timeout")], 23.0)?;

    let gas = collection.register(MetricFamily::histogram(
        "sui_gas_used_per_transaction",
        "Gas used per transaction",
        &[],
        &GAS_BUCKETS,
    )?)?;
    for gas_used in [250.0, 1500.0, 750.0, 25000.0] {
        gas.observe(&[], gas_used)?;
    }

    collection
        .register(MetricFamily::info(
            "sui_node_info",
            "Information about the Sui node",
        )?)?
        .set_info(&[
            ("version", "1.0.0"),
            ("network", "mainnet"),
            ("node_type", "validator"),
            ("build_commit", "abc123def456"),
        ])?;

    collection
        .register(MetricFamily::enumeration(
            "sui_node_status",
            "Current status of the Sui node",
            &NODE_STATES,
        )?)?
        .set_state("active")?;

    tracing::debug!(
        families = collection.len(),
        series = collection.series_count(),
        "Built sample metric fixture"
    );

    Ok(collection)
}

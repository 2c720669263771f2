//! Metric collection.
//!
//! A `MetricCollection` owns the families built for one run. It is not a
//! process-wide registry: each run constructs its own and drops it after
//! serialization.

use crate::models::metric::{InvalidSample, MetricFamily};

/// An ordered set of uniquely named metric families.
///
/// Families keep their registration order, which is also their emission
/// order on the wire.
///
/// # Example
///
/// ```
/// use shared::models::{MetricCollection, MetricFamily};
///
/// let mut collection = MetricCollection::new();
/// collection
///     .register(MetricFamily::gauge("sui_network_tps", "Transactions per second", &[]).unwrap())
///     .unwrap()
///     .set(&[], 156.7)
///     .unwrap();
///
/// let duplicate = MetricFamily::gauge("sui_network_tps", "again", &[]).unwrap();
/// assert!(collection.register(duplicate).is_err());
/// assert_eq!(collection.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricCollection {
    families: Vec<MetricFamily>,
}

impl MetricCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a family and returns a handle for populating it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSample::DuplicateFamily` if the name is already taken.
    pub fn register(&mut self, family: MetricFamily) -> Result<&mut MetricFamily, InvalidSample> {
        if self.get(family.name()).is_some() {
            return Err(InvalidSample::DuplicateFamily(family.name().to_string()));
        }
        let idx = self.families.len();
        self.families.push(family);
        Ok(&mut self.families[idx])
    }

    /// Looks up a family by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name() == name)
    }

    /// Looks up a family by name for updating.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut MetricFamily> {
        self.families.iter_mut().find(|f| f.name() == name)
    }

    /// All families in registration order.
    #[must_use]
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// Number of families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Returns true if no family is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Total number of series across all families.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.families.iter().map(MetricFamily::series_count).sum()
    }

    /// Re-checks every invariant of the collection.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: a repeated family name, a repeated
    /// label set within a family, or decreasing histogram bucket counts.
    pub fn validate(&self) -> Result<(), InvalidSample> {
        for (i, family) in self.families.iter().enumerate() {
            if self.families[..i].iter().any(|f| f.name() == family.name()) {
                return Err(InvalidSample::DuplicateFamily(family.name().to_string()));
            }
            family.validate()?;
        }
        Ok(())
    }
}

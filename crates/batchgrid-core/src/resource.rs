//! Multi-dimensional resource vectors.
//!
//! A [`Resource`] maps a dimension name (`cpu`, `memory`, `nvidia.com/gpu`,
//! ...) to a non-negative integer amount. CPU is expressed in millicores,
//! memory in bytes; scalar resources use whatever unit the cluster reports.
//!
//! All arithmetic works over the union of dimensions of both operands,
//! treating an absent dimension as zero, so vectors with different
//! dimension sets can be combined without truncation. Zero amounts are
//! never stored: a vector that returns to zero in a dimension has the
//! same representation it had before it left zero.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{AddAssign, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;

/// CPU dimension, in millicores.
pub const CPU: &str = "cpu";

/// Memory dimension, in bytes.
pub const MEMORY: &str = "memory";

/// A quantity of resources across an open set of dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct Resource {
    quantities: BTreeMap<String, u64>,
}

impl Resource {
    /// An empty vector (zero in every dimension).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style setter for a single dimension.
    pub fn with(mut self, dimension: &str, amount: u64) -> Self {
        self.set(dimension, amount);
        self
    }

    /// Amount in `dimension` (zero when absent).
    pub fn get(&self, dimension: &str) -> u64 {
        self.quantities.get(dimension).copied().unwrap_or(0)
    }

    pub fn set(&mut self, dimension: &str, amount: u64) {
        if amount == 0 {
            self.quantities.remove(dimension);
        } else {
            self.quantities.insert(dimension.to_string(), amount);
        }
    }

    /// Dimensions present in this vector, in name order.
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.quantities.keys().map(String::as_str)
    }

    /// True when every dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.quantities.values().all(|v| *v == 0)
    }

    /// Add `other` into `self`, dimension by dimension.
    pub fn add(&mut self, other: &Resource) -> &mut Self {
        for (dim, amount) in &other.quantities {
            let entry = self.quantities.entry(dim.clone()).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
        self.quantities.retain(|_, v| *v > 0);
        self
    }

    /// Subtract `other` from `self`, clamping each dimension at zero.
    ///
    /// Callers are expected to have checked `other.less_equal(self)` first;
    /// the clamp only keeps state well-formed if they did not.
    pub fn sub(&mut self, other: &Resource) -> &mut Self {
        for (dim, amount) in &other.quantities {
            if let Some(entry) = self.quantities.get_mut(dim) {
                *entry = entry.saturating_sub(*amount);
            }
        }
        self.quantities.retain(|_, v| *v > 0);
        self
    }

    /// Subtract `other` from `self`, failing without mutation on underflow.
    pub fn try_sub(&mut self, other: &Resource) -> Result<&mut Self, ResourceError> {
        for (dim, amount) in &other.quantities {
            let have = self.get(dim);
            if have < *amount {
                return Err(ResourceError::Underflow {
                    dimension: dim.clone(),
                    have,
                    need: *amount,
                });
            }
        }
        Ok(self.sub(other))
    }

    /// `true` iff every dimension of `self` is `<=` the same dimension of `other`.
    pub fn less_equal(&self, other: &Resource) -> bool {
        self.quantities
            .iter()
            .all(|(dim, amount)| *amount <= other.get(dim))
    }

    /// Share of `total` this vector takes in `dimension`, as a fraction.
    ///
    /// Returns `None` when `total` has nothing in that dimension.
    pub fn ratio(&self, total: &Resource, dimension: &str) -> Option<f64> {
        let denom = total.get(dimension);
        if denom == 0 {
            return None;
        }
        Some(self.get(dimension) as f64 / denom as f64)
    }
}

/// Equality treats an absent dimension as zero.
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.less_equal(other) && other.less_equal(self)
    }
}

impl Eq for Resource {}

impl AddAssign<&Resource> for Resource {
    fn add_assign(&mut self, rhs: &Resource) {
        self.add(rhs);
    }
}

impl SubAssign<&Resource> for Resource {
    fn sub_assign(&mut self, rhs: &Resource) {
        self.sub(rhs);
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Resource {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            quantities: iter
                .into_iter()
                .filter(|(_, v)| *v > 0)
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, u64>> for Resource {
    fn from(quantities: BTreeMap<String, u64>) -> Self {
        quantities.into_iter().collect()
    }
}

impl From<Resource> for BTreeMap<String, u64> {
    fn from(resource: Resource) -> Self {
        resource.quantities
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quantities.is_empty() {
            return f.write_str("<empty>");
        }
        let mut first = true;
        for (dim, amount) in &self.quantities {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{dim} {amount}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cpu(n: u64) -> Resource {
        Resource::empty().with(CPU, n)
    }

    #[test]
    fn add_unions_dimensions() {
        let mut a = cpu(1000);
        a.add(&Resource::empty().with(MEMORY, 512).with(CPU, 500));

        assert_eq!(a.get(CPU), 1500);
        assert_eq!(a.get(MEMORY), 512);
    }

    #[test]
    fn sub_clamps_at_zero() {
        let mut a = cpu(1000);
        a.sub(&cpu(3000));
        assert_eq!(a.get(CPU), 0);
    }

    #[test]
    fn try_sub_rejects_underflow_without_mutating() {
        let mut a = cpu(1000).with(MEMORY, 10);
        let err = a.try_sub(&cpu(500).with(MEMORY, 20)).unwrap_err();

        assert_eq!(
            err,
            ResourceError::Underflow {
                dimension: MEMORY.to_string(),
                have: 10,
                need: 20,
            }
        );
        assert_eq!(a, cpu(1000).with(MEMORY, 10));
    }

    #[test]
    fn less_equal_treats_absent_as_zero() {
        assert!(Resource::empty().less_equal(&cpu(1)));
        assert!(cpu(0).less_equal(&Resource::empty()));
        assert!(!cpu(1).less_equal(&Resource::empty()));
        assert!(cpu(2000).less_equal(&cpu(2000).with(MEMORY, 1)));
        assert!(!cpu(2000).with("nvidia.com/gpu", 1).less_equal(&cpu(4000)));
    }

    #[test]
    fn equality_ignores_zero_dimensions() {
        assert_eq!(cpu(0), Resource::empty());
        assert_eq!(cpu(5).with(MEMORY, 0), cpu(5));
        assert_ne!(cpu(5), cpu(6));
    }

    #[test]
    fn display_lists_dimensions_in_order() {
        let r = Resource::empty().with(MEMORY, 64).with(CPU, 250);
        assert_eq!(r.to_string(), "cpu 250, memory 64");
        assert_eq!(Resource::empty().to_string(), "<empty>");
    }

    #[test]
    fn returning_to_zero_drops_the_dimension() {
        let mut releasing = Resource::empty();
        releasing.add(&cpu(2000));
        releasing.sub(&cpu(2000));
        assert_eq!(releasing.dimensions().count(), 0);
        assert_eq!(serde_json::to_string(&releasing).unwrap(), "{}");

        let mut idle = cpu(1000).with(MEMORY, 64);
        idle.sub(&Resource::empty().with(MEMORY, 64));
        assert_eq!(idle.dimensions().collect::<Vec<_>>(), vec![CPU]);
    }

    #[test]
    fn zero_amounts_are_not_stored() {
        assert_eq!(cpu(0).dimensions().count(), 0);
        assert_eq!(cpu(5).with(CPU, 0).dimensions().count(), 0);
        let parsed: Resource = serde_json::from_str(r#"{"cpu": 0, "memory": 8}"#).unwrap();
        assert_eq!(parsed.dimensions().collect::<Vec<_>>(), vec![MEMORY]);
    }

    #[test]
    fn deserializes_from_plain_map() {
        let r: Resource = serde_json::from_str(r#"{"cpu": 2000, "memory": 1024}"#).unwrap();
        assert_eq!(r, cpu(2000).with(MEMORY, 1024));
    }

    fn arb_resource() -> impl Strategy<Value = Resource> {
        prop::collection::btree_map(
            prop::sample::select(vec!["cpu", "memory", "gpu"]),
            0u64..1_000_000,
            0..3,
        )
        .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn add_then_sub_restores_original(a in arb_resource(), b in arb_resource()) {
            let mut c = a.clone();
            c.add(&b);
            prop_assert!(b.less_equal(&c));
            c.sub(&b);
            for dim in a.dimensions().chain(b.dimensions()) {
                prop_assert_eq!(c.get(dim), a.get(dim));
            }
            prop_assert_eq!(
                c.dimensions().collect::<Vec<_>>(),
                a.dimensions().collect::<Vec<_>>()
            );
        }

        #[test]
        fn less_equal_is_reflexive_and_respects_add(a in arb_resource(), b in arb_resource()) {
            prop_assert!(a.less_equal(&a));
            let mut sum = a.clone();
            sum.add(&b);
            prop_assert!(a.less_equal(&sum));
        }
    }
}

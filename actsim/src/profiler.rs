//! Cost accumulation: each CHP actor advances a running delay/energy/
//! area/leakage total as it executes statements (§4.10), and the
//! simulator rolls those per-instance totals up into one [`Profiler`],
//! the way the lineage crate's own profiler aggregates per-location gas
//! costs into a single report.

use hashbrown::HashMap;
use itertools::Itertools;

/// The four cost dimensions a single CHP statement's [`crate::chp::CostAnnotation`]
/// contributes, accumulated over the lifetime of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostTotals {
    pub delay: u64,
    pub energy: u64,
    pub area: u64,
    pub leakage: u64,
}

impl CostTotals {
    pub fn accumulate(&mut self, delay: u64, energy: u64, area: u64, leakage: u64) {
        self.delay = self.delay.saturating_add(delay);
        self.energy = self.energy.saturating_add(energy);
        self.area = self.area.saturating_add(area);
        self.leakage = self.leakage.saturating_add(leakage);
    }
}

/// Aggregates [`CostTotals`] across every instance in a run, keyed by
/// instance path, and exposes the grand total.
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    per_instance: HashMap<String, CostTotals>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, instance: &str, delay: u64, energy: u64, area: u64, leakage: u64) {
        self.per_instance
            .entry(instance.to_string())
            .or_default()
            .accumulate(delay, energy, area, leakage);
    }

    pub fn totals_for(&self, instance: &str) -> CostTotals {
        self.per_instance.get(instance).copied().unwrap_or_default()
    }

    pub fn grand_total(&self) -> CostTotals {
        let mut total = CostTotals::default();
        for t in self.per_instance.values() {
            total.accumulate(t.delay, t.energy, t.area, t.leakage);
        }
        total
    }

    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.per_instance.keys().map(String::as_str)
    }

    /// Per-instance totals in instance-path order, for a report that
    /// doesn't depend on hashmap iteration order.
    pub fn report(&self) -> Vec<(&str, CostTotals)> {
        self.per_instance
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .sorted_by_key(|(k, _)| *k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_per_instance() {
        let mut profiler = Profiler::new();
        profiler.record("buf<0>", 10, 1, 2, 3);
        profiler.record("buf<0>", 5, 1, 0, 0);
        let totals = profiler.totals_for("buf<0>");
        assert_eq!(totals.delay, 15);
        assert_eq!(totals.energy, 2);
        assert_eq!(totals.area, 2);
        assert_eq!(totals.leakage, 3);
    }

    #[test]
    fn grand_total_sums_across_instances() {
        let mut profiler = Profiler::new();
        profiler.record("a", 1, 1, 1, 1);
        profiler.record("b", 2, 2, 2, 2);
        let total = profiler.grand_total();
        assert_eq!(total.delay, 3);
        assert_eq!(total.energy, 3);
    }

    #[test]
    fn unknown_instance_reports_zero() {
        let profiler = Profiler::new();
        assert_eq!(profiler.totals_for("missing"), CostTotals::default());
    }

    #[test]
    fn report_is_sorted_by_instance_path_regardless_of_insertion_order() {
        let mut profiler = Profiler::new();
        profiler.record("z_last", 1, 0, 0, 0);
        profiler.record("a_first", 2, 0, 0, 0);
        profiler.record("m_mid", 3, 0, 0, 0);
        let names: Vec<&str> = profiler.report().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a_first", "m_mid", "z_last"]);
    }
}

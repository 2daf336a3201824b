//! In-memory BSS catalog fed by simulated scans.

use std::collections::BTreeMap;

use airlink_core::{BssCatalog, CandidateBss, CandidateFilter, IfaceId};

/// Scan results per interface, ordered by signal level (strongest first).
#[derive(Debug, Clone, Default)]
pub struct SimCatalog {
    results: BTreeMap<IfaceId, Vec<CandidateBss>>,
}

impl SimCatalog {
    /// Empty catalog; nothing is known until the first scan
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the results of `iface` with a fresh scan.
    pub fn store(&mut self, iface: IfaceId, mut bsses: Vec<CandidateBss>) {
        bsses.sort_by(|a, b| b.signal.cmp(&a.signal));
        tracing::trace!(iface = %iface, count = bsses.len(), "scan results stored");
        self.results.insert(iface, bsses);
    }

    /// Drop everything known about `iface`
    pub fn flush(&mut self, iface: IfaceId) {
        self.results.remove(&iface);
    }

    /// Number of BSSes known on `iface`
    pub fn len(&self, iface: IfaceId) -> usize {
        self.results.get(&iface).map_or(0, Vec::len)
    }

    /// True when nothing is known on `iface`
    pub fn is_empty(&self, iface: IfaceId) -> bool {
        self.len(iface) == 0
    }
}

impl BssCatalog for SimCatalog {
    fn candidates(&self, iface: IfaceId, filter: &CandidateFilter) -> Vec<CandidateBss> {
        self.results
            .get(&iface)
            .map(|bsses| bsses.iter().filter(|bss| filter.matches(bss)).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use airlink_proto::MacAddr;

    use super::*;

    fn bss(last: u8, signal: i32) -> CandidateBss {
        CandidateBss::new(MacAddr([0x02, 0, 0, 0, 0, last]), "home", 2412).with_signal(signal)
    }

    #[test]
    fn strongest_signal_comes_first() {
        let mut catalog = SimCatalog::new();
        catalog.store(IfaceId(0), vec![bss(1, -70), bss(2, -40), bss(3, -55)]);

        let order: Vec<_> = catalog
            .candidates(IfaceId(0), &CandidateFilter::any())
            .iter()
            .map(|bss| bss.signal)
            .collect();
        assert_eq!(order, vec![-40, -55, -70]);
    }

    #[test]
    fn results_are_per_interface() {
        let mut catalog = SimCatalog::new();
        catalog.store(IfaceId(0), vec![bss(1, -50)]);

        assert_eq!(catalog.len(IfaceId(0)), 1);
        assert!(catalog.is_empty(IfaceId(1)));

        catalog.flush(IfaceId(0));
        assert!(catalog.candidates(IfaceId(0), &CandidateFilter::any()).is_empty());
    }
}

//! Per-category hit totals and legend ranking

use tracing::{trace, warn};

use super::registry::{Category, CategoryRegistry};
use super::wire::CategoryId;

/// Counters for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// Every event ever ingested for this category; never decremented
    pub total_count: u64,
    /// Seen in the buffer during the current render tick
    pub active_this_frame: bool,
}

/// Owns the registry and the per-category stats
pub struct CategoryAggregator {
    registry: CategoryRegistry,
    stats: Vec<CategoryStats>,
    total_hits: u64,
}

impl CategoryAggregator {
    pub fn new(registry: CategoryRegistry) -> Self {
        let stats = vec![CategoryStats::default(); registry.len()];
        Self {
            registry,
            stats,
            total_hits: 0,
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.registry.get(id)
    }

    /// Count one ingested event. Returns false for ids outside the registry.
    pub fn record_hit(&mut self, id: CategoryId) -> bool {
        match self.stats.get_mut(id.idx()) {
            Some(stats) => {
                stats.total_count += 1;
                self.total_hits += 1;
                trace!(category = id.0, total = stats.total_count, "Hit recorded");
                true
            }
            None => {
                warn!(category = id.0, "Hit for unknown category ignored");
                false
            }
        }
    }

    /// Flag a category as present in this tick's buffer snapshot
    pub fn mark_active(&mut self, id: CategoryId) {
        if let Some(stats) = self.stats.get_mut(id.idx()) {
            stats.active_this_frame = true;
        }
    }

    /// Active categories, most hits first, ties by ascending id.
    ///
    /// Clears every active flag, so the next tick starts fresh.
    pub fn legend_order(&mut self) -> Vec<CategoryId> {
        let mut active: Vec<CategoryId> = self
            .stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active_this_frame)
            .map(|(i, _)| CategoryId(i as u8))
            .collect();

        active.sort_by(|a, b| {
            let (sa, sb) = (&self.stats[a.idx()], &self.stats[b.idx()]);
            sb.total_count.cmp(&sa.total_count).then(a.cmp(b))
        });

        for stats in &mut self.stats {
            stats.active_this_frame = false;
        }

        active
    }

    pub fn stats(&self, id: CategoryId) -> Option<&CategoryStats> {
        self.stats.get(id.idx())
    }

    /// Hits across all categories
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> CategoryAggregator {
        CategoryAggregator::new(CategoryRegistry::from_labels(["a", "b", "c", "d"]))
    }

    fn hits(agg: &mut CategoryAggregator, id: u8, n: usize) {
        for _ in 0..n {
            agg.record_hit(CategoryId(id));
        }
    }

    #[test]
    fn test_legend_ranks_by_total() {
        let mut agg = aggregator();
        hits(&mut agg, 0, 10);
        hits(&mut agg, 1, 5);
        agg.mark_active(CategoryId(1));
        agg.mark_active(CategoryId(0));

        assert_eq!(agg.legend_order(), vec![CategoryId(0), CategoryId(1)]);
    }

    #[test]
    fn test_legend_ties_break_by_id() {
        let mut agg = aggregator();
        hits(&mut agg, 3, 2);
        hits(&mut agg, 1, 2);
        hits(&mut agg, 2, 7);
        for id in [3, 2, 1] {
            agg.mark_active(CategoryId(id));
        }

        assert_eq!(
            agg.legend_order(),
            vec![CategoryId(2), CategoryId(1), CategoryId(3)]
        );
    }

    #[test]
    fn test_legend_only_lists_active() {
        let mut agg = aggregator();
        hits(&mut agg, 0, 100);
        hits(&mut agg, 1, 1);
        agg.mark_active(CategoryId(1));

        assert_eq!(agg.legend_order(), vec![CategoryId(1)]);
    }

    #[test]
    fn test_legend_resets_flags() {
        let mut agg = aggregator();
        agg.mark_active(CategoryId(2));
        agg.mark_active(CategoryId(2));
        assert_eq!(agg.legend_order(), vec![CategoryId(2)]);

        assert!(agg.legend_order().is_empty());
        assert!(!agg.stats(CategoryId(2)).unwrap().active_this_frame);
    }

    #[test]
    fn test_totals_are_monotonic() {
        let mut agg = aggregator();
        hits(&mut agg, 0, 3);
        agg.mark_active(CategoryId(0));
        agg.legend_order();
        hits(&mut agg, 0, 1);

        assert_eq!(agg.stats(CategoryId(0)).unwrap().total_count, 4);
        assert_eq!(agg.total_hits(), 4);
    }

    #[test]
    fn test_unknown_category_ignored() {
        let mut agg = aggregator();
        assert!(!agg.record_hit(CategoryId(200)));
        agg.mark_active(CategoryId(200));
        assert_eq!(agg.total_hits(), 0);
        assert!(agg.legend_order().is_empty());
    }
}

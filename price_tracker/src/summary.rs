//! "Latest price per key" projection for display.

use price_common::{Key, Sample};
use std::fmt;
use std::sync::Arc;

use crate::model::TrackedSet;
use crate::store::SeriesStore;

/// Latest known value of one tracked key.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Tracked key.
    pub key: Key,
    /// Most recent stored sample, `None` when the series is empty.
    pub latest: Option<Sample>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.latest {
            Some(sample) => write!(f, "{}: Latest Price ${:.2}", self.key, sample.value),
            None => write!(f, "{}: No data available", self.key),
        }
    }
}

/// Read-only view over the tracked set and the store.
#[derive(Clone)]
pub struct SummaryView {
    tracked: Arc<TrackedSet>,
    store: Arc<SeriesStore>,
}

impl SummaryView {
    /// Build a view over `tracked` keys backed by `store`.
    pub fn new(tracked: Arc<TrackedSet>, store: Arc<SeriesStore>) -> Self {
        Self { tracked, store }
    }

    /// One entry per tracked key, in insertion order.
    ///
    /// A key whose latest fetch failed keeps reporting its last stored sample. Reading
    /// the summaries does not change what the store has cached.
    pub fn summaries(&self) -> Vec<Summary> {
        self.tracked
            .snapshot()
            .into_iter()
            .map(|key| {
                let latest = self.store.peek_latest(&key);
                Summary { key, latest }
            })
            .collect()
    }

    /// All summaries, one per line.
    pub fn render(&self) -> String {
        self.summaries()
            .iter()
            .map(Summary::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(s: &str) -> Key {
        s.parse().unwrap()
    }

    #[test]
    fn formats_latest_price_and_missing_data() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SeriesStore::open(dir.path()).unwrap());
        let tracked = Arc::new(TrackedSet::in_memory([key("AAPL"), key("MSFT")]));
        store.append(&key("AAPL"), Sample::now(190.0).unwrap()).unwrap();
        store.append(&key("AAPL"), Sample::now(191.5).unwrap()).unwrap();

        let view = SummaryView::new(tracked, store);
        let summaries = view.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].latest.unwrap().value, 191.5);
        assert_eq!(
            view.render(),
            "AAPL: Latest Price $191.50\nMSFT: No data available"
        );
    }

    #[test]
    fn summaries_do_not_warm_the_store() {
        let dir = TempDir::new().unwrap();
        SeriesStore::open(dir.path())
            .unwrap()
            .append(&key("AAPL"), Sample::now(191.5).unwrap())
            .unwrap();

        let store = Arc::new(SeriesStore::open(dir.path()).unwrap());
        let tracked = Arc::new(TrackedSet::in_memory([key("AAPL"), key("MSFT")]));
        let view = SummaryView::new(tracked, Arc::clone(&store));
        assert_eq!(
            view.render(),
            "AAPL: Latest Price $191.50\nMSFT: No data available"
        );
        assert!(store.all().is_empty());
    }

    #[test]
    fn follows_insertion_order_of_the_tracked_set() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SeriesStore::open(dir.path()).unwrap());
        let tracked = Arc::new(TrackedSet::in_memory([key("ZZZ"), key("AAA")]));
        let view = SummaryView::new(Arc::clone(&tracked), store);

        tracked.add(key("MMM")).unwrap();
        let order: Vec<String> = view.summaries().into_iter().map(|s| s.key.to_string()).collect();
        assert_eq!(order, vec!["ZZZ", "AAA", "MMM"]);
    }
}

//! Source adapter abstraction (spec.md §4.1). Every concrete adapter
//! implements [`SourceAdapter`]; the aggregator holds a heterogeneous set
//! and iterates uniformly (spec.md §9 "Polymorphic adapters").

pub mod api;
pub mod mock;
pub mod rental;
pub mod scraping;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::models::Observation;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable lowercase identifier used in provenance and as the
    /// collapse-by-source key.
    fn name(&self) -> &str;

    /// True iff the adapter has the configuration it needs.
    fn is_available(&self) -> bool;

    /// Returns 0..N observations for this round. Must not error for "no
    /// data"; must return `AdapterError` for authentication, fetch
    /// failure, block/CAPTCHA, or protocol anomaly.
    async fn fetch_prices(&self, asset_id: &str) -> Result<Vec<Observation>, AdapterError>;
}

/// Fixed display-name map used when collapsing observations by source
/// (spec.md §4.5 step 6).
pub fn display_name(source: &str) -> String {
    match source {
        "mock" => "Simulated",
        "newegg-scraper" => "Newegg",
        "bestbuy-scraper" => "Best Buy",
        "amazon-scraper" => "Amazon",
        "bhphoto-scraper" => "B&H Photo",
        "ebay" => "eBay",
        "amazon" => "Amazon API",
        "bestbuy" => "Best Buy API",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sources_map_to_fixed_display_names() {
        assert_eq!(display_name("mock"), "Simulated");
        assert_eq!(display_name("newegg-scraper"), "Newegg");
        assert_eq!(display_name("ebay"), "eBay");
        assert_eq!(display_name("amazon"), "Amazon API");
    }

    #[test]
    fn unknown_source_falls_back_to_raw_name() {
        assert_eq!(display_name("some-new-vendor"), "some-new-vendor");
    }
}

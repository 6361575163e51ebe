//! HTML-scraping adapters with anti-bot hardening (spec.md §4.1 "Scraping
//! adapters"). One generic engine driven by a per-vendor [`ScrapeVendor`]
//! so the warm-up/parse/block-detection logic is written once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{Html, Selector};

use super::SourceAdapter;
use crate::catalog::find_hardware_asset;
use crate::error::{AdapterError, AdapterErrorCode};
use crate::fetch::{is_relevant_listing, FetchOptions, ScraperApiParams, StealthClient, HARDWARE_PRICE_FLOOR_USD};
use crate::models::{now_ms, Condition, Observation, ObservationMetadata};

/// Per-vendor shape: homepage to warm up against, search URL builder,
/// fallback CSS selector families, and challenge-page markers.
pub struct ScrapeVendor {
    pub source_name: &'static str,
    pub homepage: &'static str,
    pub search_url: fn(&str) -> String,
    /// Selector families tried in order until one yields results. Each is
    /// `(listing, title, price)`.
    pub selector_families: &'static [(&'static str, &'static str, &'static str)],
    pub challenge_markers: &'static [&'static str],
}

pub static NEWEGG: ScrapeVendor = ScrapeVendor {
    source_name: "newegg-scraper",
    homepage: "https://www.newegg.com/",
    search_url: |q| format!("https://www.newegg.com/p/pl?d={}", urlencode(q)),
    selector_families: &[
        (".item-cell", ".item-title", ".price-current"),
        ("div.item-container", "a.item-title", "li.price-current"),
    ],
    challenge_markers: &["Pardon Our Interruption", "Access to this page has been denied"],
};

pub static BESTBUY: ScrapeVendor = ScrapeVendor {
    source_name: "bestbuy-scraper",
    homepage: "https://www.bestbuy.com/",
    search_url: |q| format!("https://www.bestbuy.com/site/searchpage.jsp?st={}", urlencode(q)),
    selector_families: &[
        ("li.sku-item", "h4.sku-title", "div.priceView-customer-price span"),
        ("div.list-item", ".sku-header a", ".priceView-hero-price span"),
    ],
    challenge_markers: &["Robot or human?", "Press & Hold"],
};

pub static AMAZON: ScrapeVendor = ScrapeVendor {
    source_name: "amazon-scraper",
    homepage: "https://www.amazon.com/",
    search_url: |q| format!("https://www.amazon.com/s?k={}", urlencode(q)),
    selector_families: &[
        ("div[data-component-type='s-search-result']", "h2 span", "span.a-price span.a-offscreen"),
        ("div.s-result-item", "h2 a span", "span.a-price-whole"),
    ],
    challenge_markers: &["Enter the characters you see below", "Type the characters you see in this image"],
};

pub static BHPHOTO: ScrapeVendor = ScrapeVendor {
    source_name: "bhphoto-scraper",
    homepage: "https://www.bhphotovideo.com/",
    search_url: |q| format!("https://www.bhphotovideo.com/c/search?q={}", urlencode(q)),
    selector_families: &[
        ("div[data-selenium='miniProductPage']", "[data-selenium='miniProductName']", "[data-selenium='uppedDecimalPriceFirst']"),
    ],
    challenge_markers: &["Additional Security Check", "unusual traffic"],
};

fn urlencode(q: &str) -> String {
    q.replace(' ', "+")
}

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[type='application/ld+json']").unwrap());

pub struct ScrapingAdapter {
    vendor: &'static ScrapeVendor,
    client: Arc<StealthClient>,
    use_scraper_api: bool,
}

impl ScrapingAdapter {
    pub fn new(vendor: &'static ScrapeVendor, client: Arc<StealthClient>, use_scraper_api: bool) -> Self {
        Self { vendor, client, use_scraper_api }
    }

    fn detect_block(&self, html: &str, had_any_landmark: bool) -> Option<AdapterError> {
        for marker in self.vendor.challenge_markers {
            if html.contains(marker) {
                return Some(AdapterError::new(self.vendor.source_name, AdapterErrorCode::Captcha, format!("challenge marker detected: {}", marker)));
            }
        }
        if !had_any_landmark {
            return Some(AdapterError::new(
                self.vendor.source_name,
                AdapterErrorCode::ScrapeFailed,
                "no expected structural landmarks found in response",
            ));
        }
        None
    }

    async fn fetch_search_html(&self, query: &str) -> Result<String, AdapterError> {
        let url = (self.vendor.search_url)(query);

        if self.use_scraper_api {
            let params = ScraperApiParams { url: url.clone(), render_js: false, country: Some("us".to_string()) };
            return self.client.fetch_via_scraper_api(self.vendor.source_name, &params).await;
        }

        // Warm up: homepage GET, then a randomized sleep before the real
        // search request (spec.md §4.1).
        let warmup_options = FetchOptions::default();
        let _ = self.client.fetch(self.vendor.source_name, self.vendor.homepage, &warmup_options).await;
        let sleep_ms: u64 = rand::thread_rng().gen_range(800..2500);
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;

        let options = FetchOptions { referer: Some(self.vendor.homepage.to_string()), ..Default::default() };
        self.client
            .fetch_with_retry(self.vendor.source_name, &url, &options, crate::fetch::DEFAULT_RETRY_ATTEMPTS)
            .await
    }

    /// Parses embedded JSON-LD `Product` blocks as a fallback/supplement to
    /// CSS-selector parsing (spec.md §4.1 "additionally parse any embedded
    /// structured-data product blocks").
    fn parse_structured_data(&self, document: &Html) -> Vec<(String, f64)> {
        let mut results = Vec::new();
        for script in document.select(&JSON_LD_SELECTOR) {
            let text = script.text().collect::<String>();
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            extract_product_entries(&value, &mut results);
        }
        results
    }

    fn parse_with_selectors(&self, html: &str) -> (Vec<(String, f64)>, bool) {
        let document = Html::parse_document(html);
        let mut had_landmark = false;

        for (listing_sel, title_sel, price_sel) in self.vendor.selector_families {
            let Ok(listing_selector) = Selector::parse(listing_sel) else { continue };
            let Ok(title_selector) = Selector::parse(title_sel) else { continue };
            let Ok(price_selector) = Selector::parse(price_sel) else { continue };

            let listings: Vec<_> = document.select(&listing_selector).collect();
            if listings.is_empty() {
                continue;
            }
            had_landmark = true;

            let mut results = Vec::new();
            for listing in listings {
                let Some(title_el) = listing.select(&title_selector).next() else { continue };
                let Some(price_el) = listing.select(&price_selector).next() else { continue };
                let title = title_el.text().collect::<String>().trim().to_string();
                let price_text = price_el.text().collect::<String>();
                if let Some(price) = parse_price(&price_text) {
                    results.push((title, price));
                }
            }
            if !results.is_empty() {
                return (results, had_landmark);
            }
        }

        let structured = self.parse_structured_data(&document);
        if !structured.is_empty() {
            had_landmark = true;
        }
        (structured, had_landmark)
    }
}

fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    cleaned.parse().ok()
}

fn extract_product_entries(value: &serde_json::Value, out: &mut Vec<(String, f64)>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                extract_product_entries(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            let is_product = map.get("@type").and_then(|t| t.as_str()) == Some("Product");
            if is_product {
                let name = map.get("name").and_then(|v| v.as_str());
                let price = map
                    .get("offers")
                    .and_then(|o| o.get("price").or_else(|| o.get("lowPrice")))
                    .and_then(|p| p.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| p.as_f64()));
                if let (Some(name), Some(price)) = (name, price) {
                    out.push((name.to_string(), price));
                }
            }
        }
        _ => {}
    }
}

#[async_trait]
impl SourceAdapter for ScrapingAdapter {
    fn name(&self) -> &str {
        self.vendor.source_name
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset_id: &str) -> Result<Vec<Observation>, AdapterError> {
        let Some(asset) = find_hardware_asset(asset_id) else {
            return Ok(Vec::new());
        };
        let query = asset.search_terms.first().copied().unwrap_or(asset.id);

        let html = self.fetch_search_html(query).await?;

        if let Some(block_err) = self.vendor.challenge_markers.iter().find(|m| html.contains(**m)) {
            return Err(AdapterError::new(self.vendor.source_name, AdapterErrorCode::Captcha, format!("challenge marker: {}", block_err)));
        }

        let (listings, had_landmark) = self.parse_with_selectors(&html);

        if let Some(block) = self.detect_block(&html, had_landmark) {
            return Err(block);
        }

        let now = now_ms();
        let observations = listings
            .into_iter()
            .filter(|(title, price)| *price >= HARDWARE_PRICE_FLOOR_USD && is_relevant_listing(title, query, asset.family_keyword))
            .map(|(title, price)| {
                let mut obs = Observation::new(asset_id, price, self.vendor.source_name, now);
                obs.metadata = Some(ObservationMetadata {
                    product_name: Some(title),
                    condition: Some(Condition::New),
                    ..Default::default()
                });
                obs
            })
            .collect();

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_parsing_strips_currency_symbols() {
        assert_eq!(parse_price("$1,599.99"), Some(1599.99));
        assert_eq!(parse_price("1599.99 USD"), Some(1599.99));
        assert_eq!(parse_price("not a price"), None);
    }

    #[test]
    fn structured_data_extracts_product_entries() {
        let html = r#"
            <html><body>
            <script type="application/ld+json">
            {"@type": "Product", "name": "RTX 4090 Founders Edition", "offers": {"price": "1599.99"}}
            </script>
            </body></html>
        "#;
        let document = Html::parse_document(html);
        let mut out = Vec::new();
        for script in document.select(&JSON_LD_SELECTOR) {
            let text = script.text().collect::<String>();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            extract_product_entries(&value, &mut out);
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "RTX 4090 Founders Edition");
        assert_eq!(out[0].1, 1599.99);
    }

    #[test]
    fn vendor_table_has_distinct_source_names() {
        let names = [NEWEGG.source_name, BESTBUY.source_name, AMAZON.source_name, BHPHOTO.source_name];
        let mut sorted = names.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
    }
}

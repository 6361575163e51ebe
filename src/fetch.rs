//! HTTP fetch substrate: stealth client, header/cookie randomization,
//! optional proxy rotation, retry with backoff, third-party fetch proxy
//! (spec.md §4.2).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;

use crate::error::{AdapterError, AdapterErrorCode};

const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// One browser fingerprint: a plausible header set for a real Chrome,
/// Firefox, Safari, or Edge client.
struct BrowserFingerprint {
    user_agent: &'static str,
    sec_ch_ua: Option<&'static str>,
    platform: &'static str,
}

const FINGERPRINTS: &[BrowserFingerprint] = &[
    BrowserFingerprint {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        platform: "\"Windows\"",
    },
    BrowserFingerprint {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        sec_ch_ua: None,
        platform: "\"macOS\"",
    },
    BrowserFingerprint {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        sec_ch_ua: None,
        platform: "\"Windows\"",
    },
    BrowserFingerprint {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
        sec_ch_ua: Some("\"Microsoft Edge\";v=\"124\", \"Chromium\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        platform: "\"Windows\"",
    },
];

/// A single proxy pool entry, typed by scheme.
#[derive(Debug, Clone)]
pub struct ProxyEntry {
    pub scheme: ProxyScheme,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

/// Parses a comma-separated proxy list, e.g. `http://h1:3128,socks5://h2:1080`.
pub fn parse_proxy_pool(raw: &[String]) -> Vec<ProxyEntry> {
    raw.iter()
        .filter_map(|entry| {
            let scheme = if entry.starts_with("socks5://") {
                ProxyScheme::Socks5
            } else if entry.starts_with("socks4://") {
                ProxyScheme::Socks4
            } else if entry.starts_with("https://") {
                ProxyScheme::Https
            } else if entry.starts_with("http://") {
                ProxyScheme::Http
            } else {
                return None;
            };
            Some(ProxyEntry { scheme, url: entry.clone() })
        })
        .collect()
}

/// Round-robin / random selection over a proxy pool. The cursor may be
/// incremented concurrently; exact uniqueness is not required (spec.md §5,
/// §9 "Concurrency-safe rotating proxy cursor").
pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(entries: Vec<ProxyEntry>) -> Self {
        Self { entries, cursor: AtomicUsize::new(0) }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Round-robin selection.
    pub fn next_proxy(&self) -> Option<&ProxyEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.entries.len();
        self.entries.get(i)
    }

    /// Uniform random selection.
    pub fn random_proxy(&self) -> Option<&ProxyEntry> {
        self.entries.choose(&mut rand::thread_rng())
    }
}

/// Options recognized by the stealth client (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub use_proxy: bool,
    pub proxy_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub referer: Option<String>,
}

/// Third-party fetch proxy parameters (spec.md §4.2 "Third-party fetch proxy").
#[derive(Debug, Clone)]
pub struct ScraperApiParams {
    pub url: String,
    pub render_js: bool,
    pub country: Option<String>,
}

/// HTTP client with randomized browser-like headers, optional proxy, and
/// retry/backoff — the "stealth client" of spec.md's glossary.
pub struct StealthClient {
    client: Client,
    proxy_pool: Option<ProxyPool>,
    pinned_proxy_url: Option<String>,
    scraper_api_key: Option<String>,
}

impl StealthClient {
    pub fn new(proxy_urls: Vec<String>, pinned_proxy_url: Option<String>, scraper_api_key: Option<String>) -> Self {
        let proxy_pool = if proxy_urls.is_empty() {
            None
        } else {
            Some(ProxyPool::new(parse_proxy_pool(&proxy_urls)))
        };
        Self {
            client: Client::builder()
                .cookie_store(true)
                .build()
                .expect("reqwest client builds with default TLS backend"),
            proxy_pool,
            pinned_proxy_url,
            scraper_api_key,
        }
    }

    fn random_fingerprint(&self) -> &'static BrowserFingerprint {
        FINGERPRINTS.choose(&mut rand::thread_rng()).unwrap()
    }

    fn build_request(&self, url: &str, options: &FetchOptions) -> reqwest::RequestBuilder {
        let fp = self.random_fingerprint();
        let mut builder = self
            .client
            .get(url)
            .header("User-Agent", fp.user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Connection", "keep-alive")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("sec-ch-ua-platform", fp.platform);

        if let Some(sec_ch_ua) = fp.sec_ch_ua {
            builder = builder.header("sec-ch-ua", sec_ch_ua);
        }
        if let Some(referer) = &options.referer {
            builder = builder.header("Referer", referer.clone());
        }

        let timeout = Duration::from_millis(options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        builder = builder.timeout(timeout);

        if let Some(proxy_url) = options.proxy_url.clone().or_else(|| self.pinned_proxy_url.clone()) {
            if let Ok(proxy) = reqwest::Proxy::all(&proxy_url) {
                if let Ok(client_with_proxy) = Client::builder().cookie_store(true).proxy(proxy).build() {
                    return client_with_proxy.get(url);
                }
            }
        } else if options.use_proxy {
            if let Some(pool) = &self.proxy_pool {
                if let Some(entry) = pool.next_proxy() {
                    if let Ok(proxy) = reqwest::Proxy::all(&entry.url) {
                        if let Ok(client_with_proxy) = Client::builder().cookie_store(true).proxy(proxy).build() {
                            return client_with_proxy.get(url).timeout(timeout);
                        }
                    }
                }
            }
        }

        builder
    }

    /// A single GET with stealth headers (and proxy, if configured).
    pub async fn fetch(&self, adapter: &str, url: &str, options: &FetchOptions) -> Result<String, AdapterError> {
        let response = self
            .build_request(url, options)
            .send()
            .await
            .map_err(|e| AdapterError::new(adapter, AdapterErrorCode::FetchFailed, e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 403 || status.as_u16() == 429 {
            return Err(AdapterError::new(
                adapter,
                AdapterErrorCode::Blocked,
                format!("blocked with status {}", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(AdapterError::new(
                adapter,
                AdapterErrorCode::HttpError,
                format!("upstream returned status {}", status.as_u16()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| AdapterError::new(adapter, AdapterErrorCode::FetchFailed, e.to_string()))
    }

    /// GET routed through the configured third-party fetch proxy (spec.md
    /// §4.2). Assumes `scraper_api_key` is set; the caller is responsible
    /// for checking `Config::has_third_party_fetch_proxy()` first.
    pub async fn fetch_via_scraper_api(
        &self,
        adapter: &str,
        params: &ScraperApiParams,
    ) -> Result<String, AdapterError> {
        let key = self.scraper_api_key.as_ref().ok_or_else(|| {
            AdapterError::new(adapter, AdapterErrorCode::AuthMissing, "no SCRAPER_API_KEY configured")
        })?;

        let mut query = vec![
            ("api_key".to_string(), key.clone()),
            ("url".to_string(), params.url.clone()),
            ("render_js".to_string(), params.render_js.to_string()),
        ];
        if let Some(country) = &params.country {
            query.push(("country".to_string(), country.clone()));
        }

        let response = self
            .client
            .get("https://api.scraperapi.com/")
            .query(&query)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .send()
            .await
            .map_err(|e| AdapterError::new(adapter, AdapterErrorCode::ScraperApiError, e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::new(
                adapter,
                AdapterErrorCode::ScraperApiError,
                format!("scraper API returned status {}", response.status().as_u16()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| AdapterError::new(adapter, AdapterErrorCode::ScraperApiError, e.to_string()))
    }

    /// Up to `max_attempts` tries with exponential backoff plus jitter;
    /// 403/429 forces an extra cooldown jitter before the next attempt
    /// (spec.md §4.2 "Retry policy"). The final attempt's result (success
    /// or error) is surfaced regardless of outcome.
    pub async fn fetch_with_retry(
        &self,
        adapter: &str,
        url: &str,
        options: &FetchOptions,
        max_attempts: u32,
    ) -> Result<String, AdapterError> {
        let mut attempt = 0u32;
        loop {
            let result = self.fetch(adapter, url, options).await;
            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt + 1 >= max_attempts => return Err(e),
                Err(e) => {
                    let blocked = matches!(e.code, AdapterErrorCode::Blocked);
                    let base_delay_ms = 2u64.pow(attempt) * 1000;
                    let jitter_ms: u64 = rand::thread_rng().gen_range(500..1500);
                    tokio::time::sleep(Duration::from_millis(base_delay_ms + jitter_ms)).await;
                    if blocked {
                        let cooldown_ms: u64 = rand::thread_rng().gen_range(3000..6000);
                        tokio::time::sleep(Duration::from_millis(cooldown_ms)).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Per-asset relevance predicate: the listing title must contain the model
/// identifier plus the family keyword, and must not match the accessory
/// blacklist (spec.md §4.2).
pub fn is_relevant_listing(title: &str, model_identifier: &str, family_keyword: &str) -> bool {
    let lower = title.to_lowercase();
    let model = model_identifier.to_lowercase();
    let family = family_keyword.to_lowercase();
    if !lower.contains(&model) || !lower.contains(&family) {
        return false;
    }
    !ACCESSORY_BLACKLIST.iter().any(|term| lower.contains(term))
}

const ACCESSORY_BLACKLIST: &[&str] = &["cable", "adapter", "mount", "bracket", "riser", "sticker", "case fan", "backplate"];

pub const HARDWARE_PRICE_FLOOR_USD: f64 = 50.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_pool_round_robins() {
        let pool = ProxyPool::new(parse_proxy_pool(&[
            "http://a:3128".to_string(),
            "http://b:3128".to_string(),
        ]));
        let first = pool.next_proxy().unwrap().url.clone();
        let second = pool.next_proxy().unwrap().url.clone();
        let third = pool.next_proxy().unwrap().url.clone();
        assert_eq!(first, "http://a:3128");
        assert_eq!(second, "http://b:3128");
        assert_eq!(third, "http://a:3128");
    }

    #[test]
    fn empty_pool_yields_none() {
        let pool = ProxyPool::new(vec![]);
        assert!(pool.next_proxy().is_none());
        assert!(pool.random_proxy().is_none());
    }

    #[test]
    fn parses_proxy_schemes() {
        let parsed = parse_proxy_pool(&[
            "http://a:1".to_string(),
            "socks5://b:2".to_string(),
            "not-a-url".to_string(),
        ]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].scheme, ProxyScheme::Http);
        assert_eq!(parsed[1].scheme, ProxyScheme::Socks5);
    }

    #[test]
    fn relevance_predicate_accepts_matching_title() {
        assert!(is_relevant_listing("ASUS ROG Strix RTX 4090 OC 24GB", "rtx 4090", "4090"));
    }

    #[test]
    fn relevance_predicate_rejects_accessory() {
        assert!(!is_relevant_listing("RTX 4090 PCIe Riser Cable", "rtx 4090", "4090"));
    }

    #[test]
    fn relevance_predicate_rejects_unrelated_title() {
        assert!(!is_relevant_listing("Logitech Wireless Mouse", "rtx 4090", "4090"));
    }

    #[test]
    fn relevance_predicate_requires_model_and_family_both_present() {
        // Family keyword alone, without the full model identifier, must not
        // pass on its own — both terms are required (spec.md §4.2). No
        // accessory-blacklist term appears here, isolating the AND check.
        assert!(!is_relevant_listing("4090 Mechanical Keyboard Keycap Set", "rtx 4090", "4090"));
    }
}

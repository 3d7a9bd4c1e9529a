use super::util::{get_text, with_retry};
use crate::core::config::CoinGeckoProviderConfig;
use crate::core::pricing::{CryptoListing, PriceMatrix, PricingProvider};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_PAGE_SIZE: usize = 250;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// CoinGecko compatible pricing API.
pub struct CoinGeckoProvider {
    base_url: String,
    timeout: Duration,
    retries: usize,
    retry_delay: Duration,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Self {
        CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn from_config(config: &CoinGeckoProviderConfig) -> Self {
        Self::new(&config.base_url)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_retries(config.retries, RETRY_DELAY)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: usize, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Requesting {}", url);
        let client = reqwest::Client::builder()
            .user_agent("xconv/1.0")
            .timeout(self.timeout)
            .build()?;

        let text = with_retry(|| get_text(&client, url), self.retries, self.retry_delay).await?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", url, e))
    }
}

#[async_trait]
impl PricingProvider for CoinGeckoProvider {
    async fn fiat_codes(&self) -> Result<Vec<String>> {
        let url = format!("{}/simple/supported_vs_currencies", self.base_url);
        let codes: Vec<String> = self.fetch(&url).await?;
        Ok(codes.into_iter().map(|c| c.to_lowercase()).collect())
    }

    #[instrument(name = "CoinGeckoMarkets", skip(self))]
    async fn top_crypto(&self, count: usize) -> Result<Vec<CryptoListing>> {
        let per_page = count.min(MAX_PAGE_SIZE);
        let mut listings = Vec::with_capacity(count);
        if per_page == 0 {
            return Ok(listings);
        }

        for page in 1..=count.div_ceil(per_page) {
            let url = format!(
                "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page={}&sparkline=false",
                self.base_url, per_page, page
            );
            let batch: Vec<CryptoListing> = self.fetch(&url).await?;
            let exhausted = batch.len() < per_page;
            listings.extend(batch);
            if exhausted {
                break;
            }
        }

        listings.truncate(count);
        Ok(listings)
    }

    #[instrument(name = "CoinGeckoPrice", skip(self))]
    async fn prices(&self, ids: &[String], vs: &[String]) -> Result<PriceMatrix> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            ids.join(","),
            vs.join(",")
        );
        let raw: HashMap<String, HashMap<String, Option<f64>>> = self.fetch(&url).await?;

        Ok(raw
            .into_iter()
            .map(|(id, prices)| {
                let prices = prices
                    .into_iter()
                    .filter_map(|(vs, price)| price.map(|p| (vs, p)))
                    .collect();
                (id, prices)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(request_path: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    #[tokio::test]
    async fn test_fiat_codes() {
        let mock_server =
            create_mock_server("/simple/supported_vs_currencies", r#"["usd","EUR","btc"]"#)
                .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let codes = provider.fiat_codes().await.unwrap();
        assert_eq!(codes, vec!["usd", "eur", "btc"]);
    }

    #[tokio::test]
    async fn test_top_crypto_single_page() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"[
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 90000},
            {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": 3000}
        ]"#;

        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("order", "market_cap_desc"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let listings = provider.top_crypto(100).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "bitcoin");
        assert_eq!(listings[1].symbol, "eth");
        assert_eq!(listings[1].name, "Ethereum");
    }

    #[tokio::test]
    async fn test_top_crypto_paginates() {
        let mock_server = MockServer::start().await;
        let listing = |i: usize| format!(r#"{{"id":"coin{i}","symbol":"c{i}","name":"Coin {i}"}}"#);
        let first_page: Vec<String> = (0..MAX_PAGE_SIZE).map(listing).collect();
        let second_page: Vec<String> = (MAX_PAGE_SIZE..MAX_PAGE_SIZE + 5).map(listing).collect();

        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("[{}]", first_page.join(","))),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("[{}]", second_page.join(","))),
            )
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let listings = provider.top_crypto(MAX_PAGE_SIZE + 2).await.unwrap();
        assert_eq!(listings.len(), MAX_PAGE_SIZE + 2);
        assert_eq!(listings.last().unwrap().id, "coin251");
    }

    #[tokio::test]
    async fn test_prices() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "bitcoin": {"usd": 90000.5, "eur": 83000},
            "ethereum": {"usd": 3000.25, "eur": null}
        }"#;

        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .and(query_param("vs_currencies", "usd,eur"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let ids = vec!["bitcoin".to_string(), "ethereum".to_string()];
        let vs = vec!["usd".to_string(), "eur".to_string()];
        let matrix = provider.prices(&ids, &vs).await.unwrap();

        assert_eq!(matrix["bitcoin"]["usd"], 90000.5);
        assert_eq!(matrix["bitcoin"]["eur"], 83000.0);
        assert_eq!(matrix["ethereum"]["usd"], 3000.25);
        assert!(!matrix["ethereum"].contains_key("eur"));
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/supported_vs_currencies"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let result = provider.fiat_codes().await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .starts_with("HTTP error: 500 Internal Server Error")
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_server =
            create_mock_server("/simple/supported_vs_currencies", r#"{"error": "nope"}"#).await;

        let provider = CoinGeckoProvider::new(&mock_server.uri());
        let result = provider.fiat_codes().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON response")
        );
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/supported_vs_currencies"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/simple/supported_vs_currencies"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"["usd"]"#))
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(&mock_server.uri())
            .with_retries(1, Duration::from_millis(1));
        assert_eq!(provider.fiat_codes().await.unwrap(), vec!["usd"]);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/supported_vs_currencies"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"["usd"]"#)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let provider =
            CoinGeckoProvider::new(&mock_server.uri()).with_timeout(Duration::from_millis(50));
        let result = provider.fiat_codes().await;
        assert!(result.unwrap_err().to_string().starts_with("Request error"));
    }
}

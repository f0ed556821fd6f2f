//! # Alpha Vantage 行情採集模組
//!
//! 透過 Alpha Vantage 官方 REST API 取得美股即時報價。
//!
//! ## 支援功能
//!
//! - **即時報價 (`quote`)**：`GLOBAL_QUOTE` 端點的最新成交價。
//!
//! ## 站點資訊
//!
//! - 預設端點：`https://www.alphavantage.co/query`
//! - 存取方式：HTTP GET，API Key 以 `apikey` 查詢參數傳遞
//! - 免費方案每分鐘 5 次，超過時回應會帶 `Note` 或 `Information`

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, Url};

use crate::{config, util};

/// 即時報價子模組
pub mod quote;

const FUNCTION_GLOBAL_QUOTE: &str = "GLOBAL_QUOTE";
const REDACTED_API_KEY: &str = "REDACTED_API_KEY";

/// Alpha Vantage 採集器，持有憑證與已設定逾時的 HTTP client
pub struct AlphaVantage {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(api_key: String, endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(AlphaVantage {
            client: util::http::build_client(timeout)?,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    pub fn from_settings(settings: &config::Quote, api_key: String) -> Result<Self> {
        Self::new(api_key, &settings.endpoint, settings.timeout())
    }

    fn quote_url(&self, stock_symbol: &str) -> Result<Url> {
        self.build_url(stock_symbol, &self.api_key)
    }

    /// 日誌用的網址，API Key 以固定字串取代
    fn redacted_quote_url(&self, stock_symbol: &str) -> Result<Url> {
        self.build_url(stock_symbol, REDACTED_API_KEY)
    }

    fn build_url(&self, stock_symbol: &str, api_key: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("function", FUNCTION_GLOBAL_QUOTE),
                ("symbol", stock_symbol),
                ("apikey", api_key),
            ],
        )
        .map_err(|why| anyhow!("Failed to build URL from '{}' because {:?}", self.endpoint, why))
    }
}

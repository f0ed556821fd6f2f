use reqwest::StatusCode;
use thiserror::Error;

use crate::{logging::Level, util::error_chain};

/// Alpha Vantage 行情 API
pub mod alpha_vantage;

/// Why a single quote lookup produced no price.
///
/// Each kind maps to the severity it is logged at, see [`FetchFailure::level`].
#[derive(Error, Debug)]
pub enum FetchFailure {
    #[error("HTTP error {status}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("API note: {0}")]
    Advisory(String),

    #[error("response is missing '{field}'")]
    MissingField { field: &'static str, payload: String },

    #[error("unexpected response format")]
    UnexpectedShape { payload: String },

    #[error("connection error: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("could not parse response: {reason}")]
    MalformedBody { reason: String, body: String },

    #[error("request error: {0}")]
    Request(String),

    #[error("unexpected error: {0}")]
    Unclassified(String),
}

impl FetchFailure {
    pub fn level(&self) -> Level {
        match self {
            FetchFailure::Advisory(_) => Level::Warn,
            FetchFailure::Unclassified(_) => Level::Critical,
            _ => Level::Error,
        }
    }

    /// 寫入日誌的完整訊息，包含回應內容以利除錯
    pub fn log_message(&self, stock_symbol: &str) -> String {
        match self {
            FetchFailure::HttpStatus { status, body } => format!(
                "HTTP error fetching data for {}: {}. Response: {}",
                stock_symbol, status, body
            ),
            FetchFailure::Api(msg) => {
                format!("Alpha Vantage API error for {}: {}", stock_symbol, msg)
            }
            FetchFailure::Advisory(msg) => {
                format!("Alpha Vantage API note for {}: {}", stock_symbol, msg)
            }
            FetchFailure::MissingField { field, payload } => format!(
                "Missing '{}' in response for {}. Data: {}",
                field, stock_symbol, payload
            ),
            FetchFailure::UnexpectedShape { payload } => format!(
                "Unexpected API response format for {}. Full response: {}",
                stock_symbol, payload
            ),
            FetchFailure::MalformedBody { reason, body } => format!(
                "JSON parsing error for {}: {}. Response text: {}",
                stock_symbol, reason, body
            ),
            FetchFailure::Connect(_)
            | FetchFailure::Timeout(_)
            | FetchFailure::Request(_)
            | FetchFailure::Unclassified(_) => {
                format!("Failed to fetch data for {} because {}", stock_symbol, self)
            }
        }
    }

    /// 顯示在主控台的簡短訊息，不含回應內容
    pub fn console_message(&self, stock_symbol: &str) -> String {
        match self {
            FetchFailure::Api(msg) => format!("API Error for {}: {}", stock_symbol, msg),
            FetchFailure::Advisory(msg) => format!("API Note for {}: {}", stock_symbol, msg),
            _ => format!("Failed to fetch price for {}: {}", stock_symbol, self),
        }
    }

    /// Classifies a transport-level reqwest failure.
    ///
    /// The URL is stripped before the error is rendered so the credential in
    /// the query string never reaches a log line.
    pub fn from_transport(why: reqwest::Error) -> Self {
        let why = why.without_url();
        let detail = error_chain(&why);

        if why.is_timeout() {
            FetchFailure::Timeout(detail)
        } else if why.is_connect() {
            FetchFailure::Connect(detail)
        } else if why.is_decode() || why.is_body() {
            FetchFailure::MalformedBody {
                reason: detail,
                body: String::new(),
            }
        } else if why.is_request() || why.is_redirect() || why.is_status() {
            FetchFailure::Request(detail)
        } else {
            FetchFailure::Unclassified(detail)
        }
    }
}

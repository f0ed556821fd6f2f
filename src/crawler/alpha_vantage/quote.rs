use serde_json::Value;

use crate::{
    crawler::{alpha_vantage::AlphaVantage, FetchFailure},
    declare::QuoteResult,
    logging::{Level, Logger},
};

const FIELD_GLOBAL_QUOTE: &str = "Global Quote";
const FIELD_PRICE: &str = "05. price";
const FIELD_ERROR_MESSAGE: &str = "Error Message";
/// 呼叫頻率超過限制時的提示
const FIELD_NOTE: &str = "Note";
/// 較新的限流提示欄位，處理方式與 Note 相同
const FIELD_INFORMATION: &str = "Information";

/// 價格可能是字串或數字，其餘型別視為沒有價格
fn price_of(payload: &Value) -> Option<String> {
    match payload.get(FIELD_GLOBAL_QUOTE)?.get(FIELD_PRICE)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 欄位只要存在即採用，非字串的值以 JSON 原文呈現
fn text_of(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

impl AlphaVantage {
    /// Fetches the latest price of `stock_symbol`.
    ///
    /// Every failure is logged at its own severity and reported as an absent
    /// price; nothing is retried.
    pub async fn fetch(&self, stock_symbol: &str, logger: &Logger) -> QuoteResult {
        logger.info(format!(
            "Initiating stock price fetch for symbol: {}",
            stock_symbol
        ));

        match self.try_fetch(stock_symbol, logger).await {
            Ok(price) => {
                logger.info(format!(
                    "Successfully fetched price for {}: {}",
                    stock_symbol, price
                ));
                QuoteResult::new(stock_symbol, Some(price))
            }
            Err(why) => {
                logger.log(why.level(), why.log_message(stock_symbol));
                println!("{}", why.console_message(stock_symbol));
                QuoteResult::new(stock_symbol, None)
            }
        }
    }

    pub async fn try_fetch(&self, stock_symbol: &str, logger: &Logger) -> Result<String, FetchFailure> {
        let url = self
            .quote_url(stock_symbol)
            .map_err(|why| FetchFailure::Unclassified(format!("{:?}", why)))?;

        if logger.enabled(Level::Debug) {
            if let Ok(redacted) = self.redacted_quote_url(stock_symbol) {
                logger.debug(format!("Requesting URL: {}", redacted));
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchFailure::from_transport)?;
        let status = response.status();

        logger.info(format!(
            "API response status code for {}: {}",
            stock_symbol,
            status.as_u16()
        ));

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchFailure::HttpStatus { status, body });
        }

        let text = response
            .text()
            .await
            .map_err(FetchFailure::from_transport)?;

        parse_quote(&text)
    }
}

/// 依序判斷：價格、錯誤訊息、限流提示，最後才是無法辨識的格式
fn parse_quote(text: &str) -> Result<String, FetchFailure> {
    let payload: Value =
        serde_json::from_str(text).map_err(|why| FetchFailure::MalformedBody {
            reason: why.to_string(),
            body: text.to_string(),
        })?;

    if let Some(price) = price_of(&payload) {
        return Ok(price);
    }

    if let Some(msg) = text_of(&payload, FIELD_ERROR_MESSAGE) {
        return Err(FetchFailure::Api(msg));
    }

    // 帶有價格的提示已在第一步回傳
    if let Some(msg) =
        text_of(&payload, FIELD_NOTE).or_else(|| text_of(&payload, FIELD_INFORMATION))
    {
        return Err(FetchFailure::Advisory(msg));
    }

    if payload.get(FIELD_GLOBAL_QUOTE).is_some() {
        return Err(FetchFailure::MissingField {
            field: FIELD_PRICE,
            payload: payload.to_string(),
        });
    }

    Err(FetchFailure::UnexpectedShape {
        payload: payload.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use axum::{
        extract::Query,
        http::{header::CONTENT_TYPE, StatusCode},
        routing::get,
        Router,
    };

    use crate::logging::LogMessage;

    use super::*;

    const API_KEY: &str = "SECRET-KEY-123";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{}/query", addr)
    }

    fn json_route(status: StatusCode, body: &'static str) -> Router {
        Router::new().route(
            "/query",
            get(move || async move { (status, [(CONTENT_TYPE, "application/json")], body) }),
        )
    }

    async fn fetch_from(
        endpoint: &str,
        timeout: Duration,
    ) -> (QuoteResult, Vec<LogMessage>) {
        let (logger, rx) = Logger::channel(Level::Debug);
        let av = AlphaVantage::new(API_KEY.to_string(), endpoint, timeout).unwrap();
        let result = av.fetch("AMZN", &logger).await;
        drop(logger);

        (result, rx.iter().collect())
    }

    async fn fetch_json(status: StatusCode, body: &'static str) -> (QuoteResult, Vec<LogMessage>) {
        let endpoint = serve(json_route(status, body)).await;
        fetch_from(&endpoint, Duration::from_secs(10)).await
    }

    fn count(logs: &[LogMessage], level: Level) -> usize {
        logs.iter().filter(|l| l.level == level).count()
    }

    #[tokio::test]
    async fn test_fetch_price() {
        let (result, logs) = fetch_json(
            StatusCode::OK,
            r#"{"Global Quote": {"01. symbol": "AMZN", "05. price": "150.00", "07. latest trading day": "2024-05-31"}}"#,
        )
        .await;

        assert_eq!(result, QuoteResult::new("AMZN", Some("150.00".to_string())));
        assert_eq!(count(&logs, Level::Error), 0);
        assert!(logs
            .iter()
            .any(|l| l.msg == "Successfully fetched price for AMZN: 150.00"));
    }

    #[tokio::test]
    async fn test_fetch_sends_query_parameters() {
        let router = Router::new().route(
            "/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let ok = params.get("function").map(String::as_str) == Some("GLOBAL_QUOTE")
                    && params.get("symbol").map(String::as_str) == Some("AMZN")
                    && params.get("apikey").map(String::as_str) == Some(API_KEY);
                if ok {
                    (StatusCode::OK, r#"{"Global Quote": {"05. price": "1.00"}}"#)
                } else {
                    (StatusCode::BAD_REQUEST, r#"{}"#)
                }
            }),
        );
        let endpoint = serve(router).await;

        let (result, _) = fetch_from(&endpoint, Duration::from_secs(10)).await;
        assert_eq!(result.price.as_deref(), Some("1.00"));
    }

    #[tokio::test]
    async fn test_fetch_error_message_logs_error_only() {
        let (result, logs) = fetch_json(
            StatusCode::OK,
            r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#,
        )
        .await;

        assert_eq!(result, QuoteResult::new("AMZN", None));
        assert_eq!(count(&logs, Level::Error), 1);
        assert_eq!(count(&logs, Level::Warn), 0);
        assert_eq!(count(&logs, Level::Critical), 0);
        assert!(logs.iter().any(|l| l.level == Level::Error
            && l.msg.starts_with("Alpha Vantage API error for AMZN: Invalid API call")));
    }

    #[tokio::test]
    async fn test_fetch_note_logs_warning() {
        let (result, logs) = fetch_json(
            StatusCode::OK,
            r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
        )
        .await;

        assert_eq!(result, QuoteResult::new("AMZN", None));
        assert_eq!(count(&logs, Level::Warn), 1);
        assert_eq!(count(&logs, Level::Error), 0);
    }

    #[tokio::test]
    async fn test_fetch_information_is_advisory() {
        let (result, logs) = fetch_json(
            StatusCode::OK,
            r#"{"Information": "We have detected your API key and our standard API rate limit is 25 requests per day."}"#,
        )
        .await;

        assert!(!result.is_available());
        assert_eq!(count(&logs, Level::Warn), 1);
    }

    #[tokio::test]
    async fn test_fetch_price_wins_over_note() {
        let (result, logs) = fetch_json(
            StatusCode::OK,
            r#"{"Note": "footer", "Global Quote": {"05. price": "99.5"}}"#,
        )
        .await;

        assert_eq!(result.price.as_deref(), Some("99.5"));
        assert_eq!(count(&logs, Level::Warn), 0);
    }

    #[tokio::test]
    async fn test_fetch_numeric_price() {
        let (result, _) = fetch_json(StatusCode::OK, r#"{"Global Quote": {"05. price": 12.5}}"#).await;
        assert_eq!(result.price.as_deref(), Some("12.5"));
    }

    #[tokio::test]
    async fn test_fetch_empty_global_quote() {
        let (result, logs) = fetch_json(StatusCode::OK, r#"{"Global Quote": {}}"#).await;

        assert!(!result.is_available());
        assert!(logs.iter().any(|l| l.level == Level::Error
            && l.msg.contains("Missing '05. price'")
            && l.msg.contains(r#"{"Global Quote":{}}"#)));
    }

    #[tokio::test]
    async fn test_fetch_unexpected_shape_logs_payload() {
        let (result, logs) = fetch_json(StatusCode::OK, r#"{"foo": 1}"#).await;

        assert!(!result.is_available());
        assert!(logs.iter().any(|l| l.level == Level::Error
            && l.msg == r#"Unexpected API response format for AMZN. Full response: {"foo":1}"#));

        let (result, logs) = fetch_json(StatusCode::OK, r#"["AMZN"]"#).await;
        assert!(!result.is_available());
        assert!(logs
            .iter()
            .any(|l| l.level == Level::Error && l.msg.contains("Unexpected API response format")));
    }

    #[tokio::test]
    async fn test_fetch_http_status() {
        let (result, logs) =
            fetch_json(StatusCode::SERVICE_UNAVAILABLE, r#"{"detail": "maintenance"}"#).await;

        assert!(!result.is_available());
        assert!(logs
            .iter()
            .any(|l| l.msg == "API response status code for AMZN: 503"));
        assert!(logs.iter().any(|l| l.level == Level::Error
            && l.msg.starts_with("HTTP error fetching data for AMZN: 503")
            && l.msg.contains("maintenance")));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let (result, logs) = fetch_json(StatusCode::OK, "<html>busy</html>").await;

        assert!(!result.is_available());
        assert!(logs.iter().any(|l| l.level == Level::Error
            && l.msg.starts_with("JSON parsing error for AMZN")
            && l.msg.contains("<html>busy</html>")));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let router = Router::new().route(
            "/query",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        let endpoint = serve(router).await;

        let (logger, _rx) = Logger::channel(Level::Debug);
        let av = AlphaVantage::new(API_KEY.to_string(), &endpoint, Duration::from_millis(200))
            .unwrap();
        let failure = av.try_fetch("AMZN", &logger).await.unwrap_err();

        assert!(matches!(failure, FetchFailure::Timeout(_)), "{:?}", failure);
        assert_eq!(failure.level(), Level::Error);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = format!("http://127.0.0.1:{}/query", port);

        let (logger, _rx) = Logger::channel(Level::Debug);
        let av = AlphaVantage::new(API_KEY.to_string(), &endpoint, Duration::from_secs(2)).unwrap();
        let failure = av.try_fetch("AMZN", &logger).await.unwrap_err();

        assert!(matches!(failure, FetchFailure::Connect(_)), "{:?}", failure);
    }

    #[tokio::test]
    async fn test_fetch_invalid_endpoint_is_critical() {
        let (result, logs) = fetch_from("not a url", Duration::from_secs(1)).await;

        assert!(!result.is_available());
        assert_eq!(count(&logs, Level::Critical), 1);
    }

    #[tokio::test]
    async fn test_api_key_never_logged() {
        let (_, mut logs) = fetch_json(
            StatusCode::OK,
            r#"{"Global Quote": {"05. price": "150.00"}}"#,
        )
        .await;
        let (_, error_logs) = fetch_json(StatusCode::FORBIDDEN, r#"{"denied": true}"#).await;
        logs.extend(error_logs);
        let (_, refused_logs) = fetch_from("http://127.0.0.1:1/query", Duration::from_secs(2)).await;
        logs.extend(refused_logs);

        assert!(logs.iter().all(|l| !l.msg.contains(API_KEY)));
        assert!(logs.iter().any(|l| l.level == Level::Debug
            && l.msg.contains("apikey=REDACTED_API_KEY")
            && l.msg.contains("function=GLOBAL_QUOTE")
            && l.msg.contains("symbol=AMZN")));
    }

    #[test]
    fn test_parse_quote_decision_order() {
        assert!(matches!(
            parse_quote(r#"{"Error Message": "bad", "Note": "slow"}"#),
            Err(FetchFailure::Api(_))
        ));
        assert!(matches!(
            parse_quote(r#"{"Note": "slow", "Global Quote": {}}"#),
            Err(FetchFailure::Advisory(_))
        ));
        assert!(matches!(
            parse_quote(r#"{"Global Quote": {"05. price": null}}"#),
            Err(FetchFailure::MissingField { .. })
        ));
        assert!(matches!(
            parse_quote(r#"{"Error Message": 42}"#),
            Err(FetchFailure::Api(msg)) if msg == "42"
        ));
        assert!(matches!(
            parse_quote(r#"["Global Quote"]"#),
            Err(FetchFailure::UnexpectedShape { .. })
        ));
        assert_eq!(
            parse_quote(r#"{"Global Quote": {"05. price": "abc"}}"#).unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_parse_quote_ignores_sibling_field_types() {
        assert_eq!(
            parse_quote(r#"{"Global Quote": {"05. price": "150.00"}, "Information": {"detail": "x"}}"#)
                .unwrap(),
            "150.00"
        );
        assert!(matches!(
            parse_quote(r#"{"Error Message": "bad key", "Note": 5}"#),
            Err(FetchFailure::Api(msg)) if msg == "bad key"
        ));
        assert!(matches!(
            parse_quote(r#"{"Note": {"limit": 5}}"#),
            Err(FetchFailure::Advisory(msg)) if msg == r#"{"limit":5}"#
        ));
        assert!(matches!(
            parse_quote(r#"{"Global Quote": "n/a"}"#),
            Err(FetchFailure::MissingField { .. })
        ));
    }
}

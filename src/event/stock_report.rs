use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use concat_string::concat_string;

use crate::{
    bot::email::{self, LettreConnector},
    config::{App, EmailSettings},
    crawler::alpha_vantage::AlphaVantage,
    declare::{EmailMessage, QuoteResult},
    logging::Logger,
    report,
};

const CONFIG_HINT: &str = "To use actual email settings, ensure TO_EMAIL, FROM_EMAIL, SMTP_SERVER, SMTP_PORT, SMTP_USER, and especially SMTP_PASSWORD are correctly set (e.g., via environment variables or app.json).";

/// What to do with the report once it has been formatted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// 設定完整，直接寄出
    Send,
    /// 密碼已設定但仍有佔位值，詢問使用者
    Confirm,
    SkipMissingPassword,
    SkipNonInteractive,
}

pub fn decide_dispatch(settings: &EmailSettings, interactive: bool) -> Dispatch {
    if !settings.placeholders_used && settings.password_set {
        Dispatch::Send
    } else if !interactive {
        Dispatch::SkipNonInteractive
    } else if !settings.password_set {
        Dispatch::SkipMissingPassword
    } else {
        Dispatch::Confirm
    }
}

/// 設定不完整時的警告內容
fn config_warning(settings: &EmailSettings) -> Option<String> {
    let mut reasons = Vec::with_capacity(2);

    if settings.placeholders_used {
        reasons.push("Default placeholder email values (recipient, sender, or server details) are being used.");
    }

    if !settings.password_set {
        reasons.push("SMTP_PASSWORD is not set.");
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(" "))
    }
}

/// SMTP 帳號不在這裡，只記錄在 debug
fn config_summary(settings: &EmailSettings) -> String {
    format!(
        "Email Configuration - To: {}, From: {}, Server: {}:{}, Password Set: {}",
        settings.to,
        settings.from,
        settings.smtp_server,
        settings.smtp_port,
        if settings.password_set { "Yes" } else { "No" }
    )
}

fn send_outcome(sent: bool) -> &'static str {
    if sent {
        "Email sent successfully!"
    } else {
        "Email was not sent. Check the log for details."
    }
}

/// Fetches each symbol in order, one request at a time.
pub async fn collect_quotes(
    fetcher: &AlphaVantage,
    symbols: &[String],
    logger: &Logger,
) -> Vec<QuoteResult> {
    logger.info(format!("Processing symbols: {}", symbols.join(", ")));

    let mut results = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        logger.info(format!("Attempting to fetch price for symbol: {}", symbol));

        let result = fetcher.fetch(symbol, logger).await;
        if result.is_available() {
            logger.info(format!(
                "Successfully processed and stored data for symbol: {}",
                symbol
            ));
        } else {
            logger.warn(format!(
                "Failed to get price for symbol: {}, storing as (Symbol, None).",
                symbol
            ));
        }

        results.push(result);
    }

    let fetched = results.iter().filter(|r| r.is_available()).count();
    logger.info(format!(
        "Finished fetching all symbols. Successfully fetched prices for {}/{} symbols.",
        fetched,
        symbols.len()
    ));

    results
}

/// 單次執行：取價、輸出報表，再依設定決定是否寄信
pub async fn execute(app: &App, logger: &Logger) -> Result<()> {
    let api_key = match &app.quote.api_key {
        Some(key) => key.trim().to_string(),
        None => prompt("Enter your Alpha Vantage API key: ")?,
    };

    if api_key.is_empty() {
        logger.warn("Alpha Vantage API key not provided.".to_string());
        println!("API key is required to fetch stock prices.");
        logger.error("Script cannot proceed without API key.".to_string());
        return Ok(());
    }

    logger.info(format!(
        "Alpha Vantage API key provided (length: {}).",
        api_key.len()
    ));

    let fetcher = AlphaVantage::from_settings(&app.quote, api_key)?;
    let results = collect_quotes(&fetcher, &app.quote.symbols, logger).await;

    let report = report::format_prices(&results);
    logger.info(format!("Formatted stock data for email:\n{}", report));
    println!("\n--- Formatted Stock Prices ---");
    println!("{}", report);

    let settings = app.email.resolve();
    logger.info(config_summary(&settings));
    logger.debug(format!("Email Configuration - User: {}", settings.smtp_user));
    println!("\n--- Email Sending ---");

    let warning = config_warning(&settings);
    if let Some(warning) = &warning {
        logger.warn(concat_string!("Email sending check: ", warning));
        println!("{}", concat_string!("WARNING: ", warning));
        println!("{}", CONFIG_HINT);
    }

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    match decide_dispatch(&settings, interactive) {
        Dispatch::Send => {
            logger.info("Attempting to send email with fully configured credentials.".to_string());
            println!("{}", send_outcome(send_report(&settings, report, logger)));
        }
        Dispatch::Confirm => {
            let answer = prompt("Do you want to attempt to send the email with the current (potentially placeholder) settings? (yes/no): ")?;
            if answer.eq_ignore_ascii_case("yes") {
                logger.info("User opted to proceed with potentially placeholder email configuration (password is set).".to_string());
                println!("{}", send_outcome(send_report(&settings, report, logger)));
            } else {
                logger.info("Email sending skipped by user decision (placeholders active).".to_string());
                println!("Email sending skipped by user.");
            }
        }
        Dispatch::SkipMissingPassword => {
            println!("Email cannot be sent without SMTP_PASSWORD.");
            logger.error("Email sending skipped: SMTP_PASSWORD is not configured.".to_string());
        }
        Dispatch::SkipNonInteractive => {
            let warning = warning.unwrap_or_default();
            logger.warn(format!(
                "Running in non-interactive mode. {} Email sending will be skipped.",
                warning
            ));
            println!(
                "Non-interactive mode: {} Email sending skipped. Configure settings properly for automated emails.",
                warning
            );
        }
    }

    Ok(())
}

fn send_report(settings: &EmailSettings, report: String, logger: &Logger) -> bool {
    let message = EmailMessage::new(settings, report);

    // SMTP 連線為同步 I/O
    tokio::task::block_in_place(|| {
        email::send(&LettreConnector::new(), &message, settings.timeout, logger)
    })
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    Ok(line.trim().to_string())
}

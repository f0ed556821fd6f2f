use std::{env, fmt, path::PathBuf, time::Duration};

use anyhow::Result;
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::logging::Logger;

const CONFIG_PATH: &str = "app.json";

const ALPHA_VANTAGE_API_KEY: &str = "ALPHA_VANTAGE_API_KEY";
const ALPHA_VANTAGE_ENDPOINT: &str = "ALPHA_VANTAGE_ENDPOINT";
const STOCK_SYMBOLS: &str = "STOCK_SYMBOLS";

const TO_EMAIL: &str = "TO_EMAIL";
const FROM_EMAIL: &str = "FROM_EMAIL";
const SMTP_SERVER: &str = "SMTP_SERVER";
const SMTP_PORT: &str = "SMTP_PORT";
const SMTP_USER: &str = "SMTP_USER";
const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

const DEFAULT_ENDPOINT: &str = "https://www.alphavantage.co/query";
const DEFAULT_SYMBOLS: [&str; 3] = ["AMZN", "NVDA", "GOOG"];
const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 10;

const PLACEHOLDER_TO_EMAIL: &str = "recipient_email@example.com";
const PLACEHOLDER_FROM_EMAIL: &str = "your_email@example.com";
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SUBJECT: &str = "Daily Stock Price Report";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub quote: Quote,
    #[serde(default)]
    pub email: Email,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Quote {
    /// 只在環境變數提供，不寫入設定檔
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_quote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Quote {
    fn default() -> Self {
        Quote {
            api_key: None,
            endpoint: default_endpoint(),
            symbols: default_symbols(),
            timeout_secs: default_quote_timeout_secs(),
        }
    }
}

impl fmt::Debug for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quote")
            .field("api_key_set", &self.api_key.is_some())
            .field("endpoint", &self.endpoint)
            .field("symbols", &self.symbols)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Quote {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Email settings as supplied by `app.json` and the environment.
///
/// `None` means the value was not supplied anywhere; see [`Email::resolve`].
#[derive(Serialize, Deserialize, Default, Clone)]
pub struct Email {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Email")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("password_set", &self.smtp_password.is_some())
            .field("subject", &self.subject)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Fully resolved email settings, with defaults applied.
#[derive(Clone)]
pub struct EmailSettings {
    pub to: String,
    pub from: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub subject: String,
    pub timeout: Duration,
    /// A non-empty password was supplied.
    pub password_set: bool,
    /// The recipient, sender or SMTP user is one of the placeholder addresses.
    pub placeholders_used: bool,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .field("password_set", &self.password_set)
            .field("placeholders_used", &self.placeholders_used)
            .finish()
    }
}

impl Email {
    pub fn resolve(&self) -> EmailSettings {
        let smtp_password = self
            .smtp_password
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_default();
        let from = self
            .from
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_FROM_EMAIL.to_string());

        let to = self
            .to
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_TO_EMAIL.to_string());
        // SMTP 帳號通常與寄件者相同
        let smtp_user = self.smtp_user.clone().unwrap_or_else(|| from.clone());
        // 未設定時的預設值與明確設定成範例地址都算佔位值
        let placeholders_used = [&to, &from, &smtp_user]
            .iter()
            .any(|address| is_placeholder(address));

        EmailSettings {
            to,
            from,
            smtp_user,
            smtp_server: self
                .smtp_server
                .clone()
                .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
            smtp_port: self.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
            password_set: !smtp_password.is_empty(),
            smtp_password,
            subject: self
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS)),
            placeholders_used,
        }
    }
}

impl App {
    /// 讀取 app.json（若存在）並以環境變數覆蓋
    pub fn load(logger: &Logger) -> Self {
        let app = match Self::from_file() {
            Ok(app) => app,
            Err(why) => {
                logger.error(format!(
                    "I can't read the config context because {:?}",
                    why
                ));
                App::default()
            }
        };

        app.override_with_env(logger)
    }

    fn from_file() -> Result<Self> {
        let config_path = config_path();
        if !config_path.exists() {
            return Ok(App::default());
        }

        let app = config_config::builder()
            .add_source(config_file::from(config_path))
            .build()?
            .try_deserialize()?;

        Ok(app)
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(self, logger: &Logger) -> Self {
        self.override_with(|key| env::var(key).ok(), logger)
    }

    fn override_with<F>(mut self, lookup: F, logger: &Logger) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup(ALPHA_VANTAGE_API_KEY) {
            self.quote.api_key = Some(api_key);
        }

        if let Some(endpoint) = lookup(ALPHA_VANTAGE_ENDPOINT) {
            self.quote.endpoint = endpoint;
        }

        if let Some(symbols) = lookup(STOCK_SYMBOLS) {
            let symbols = parse_symbols(&symbols);
            if !symbols.is_empty() {
                self.quote.symbols = symbols;
            }
        }

        if let Some(to) = lookup(TO_EMAIL) {
            self.email.to = Some(to);
        }

        if let Some(from) = lookup(FROM_EMAIL) {
            self.email.from = Some(from);
        }

        if let Some(server) = lookup(SMTP_SERVER) {
            self.email.smtp_server = Some(server);
        }

        if let Some(port) = lookup(SMTP_PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) => self.email.smtp_port = Some(port),
                Err(_) => {
                    logger.error(format!(
                        "Invalid SMTP_PORT: '{}'. Must be an integer. Defaulting to {}.",
                        port, DEFAULT_SMTP_PORT
                    ));
                    println!(
                        "Warning: Invalid SMTP_PORT configured ('{}'). Using default {}.",
                        port, DEFAULT_SMTP_PORT
                    );
                    self.email.smtp_port = Some(DEFAULT_SMTP_PORT);
                }
            }
        }

        if let Some(user) = lookup(SMTP_USER) {
            self.email.smtp_user = Some(user);
        }

        if let Some(password) = lookup(SMTP_PASSWORD) {
            self.email.smtp_password = Some(password);
        }

        self
    }
}

fn is_placeholder(address: &str) -> bool {
    let address = address.trim();
    address.eq_ignore_ascii_case(PLACEHOLDER_TO_EMAIL)
        || address.eq_ignore_ascii_case(PLACEHOLDER_FROM_EMAIL)
}

fn parse_symbols(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_symbols() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

fn default_quote_timeout_secs() -> u64 {
    DEFAULT_QUOTE_TIMEOUT_SECS
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

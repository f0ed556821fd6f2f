use std::fmt;

use crate::config::EmailSettings;

/// 單一股票的報價結果，取價失敗時 price 為 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResult {
    pub symbol: String,
    pub price: Option<String>,
}

impl QuoteResult {
    pub fn new(symbol: &str, price: Option<String>) -> Self {
        QuoteResult {
            symbol: symbol.to_string(),
            price,
        }
    }

    pub fn is_available(&self) -> bool {
        self.price.is_some()
    }
}

/// A single plain-text email together with the SMTP account used to send it.
#[derive(Clone)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub from: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl EmailMessage {
    pub fn new(settings: &EmailSettings, body: String) -> Self {
        EmailMessage {
            subject: settings.subject.clone(),
            body,
            to: settings.to.clone(),
            from: settings.from.clone(),
            host: settings.smtp_server.clone(),
            port: settings.smtp_port,
            user: settings.smtp_user.clone(),
            password: settings.smtp_password.clone(),
        }
    }
}

impl fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailMessage")
            .field("subject", &self.subject)
            .field("to", &self.to)
            .field("from", &self.from)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

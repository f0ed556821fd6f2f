use std::{
    error::Error as StdError,
    io,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::{
        self,
        authentication::{Credentials, Mechanism},
        client::{SmtpConnection, TlsParameters},
        extension::ClientId,
    },
};
use strum::Display;
use thiserror::Error;

use crate::{
    declare::EmailMessage,
    logging::{Level, Logger},
    util::{self, error_chain},
};

/// SMTPS 預設埠，連線即使用 TLS
pub const SMTPS_PORT: u16 = 465;

/// How the TLS session is established, chosen from the port alone.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum Security {
    /// TLS from the first byte (SMTPS).
    #[strum(to_string = "SMTP over implicit TLS")]
    ImplicitTls,
    /// Plaintext connect, then EHLO, STARTTLS and EHLO again.
    #[strum(to_string = "SMTP with STARTTLS")]
    StartTls,
}

impl Security {
    pub fn for_port(port: u16) -> Self {
        if port == SMTPS_PORT {
            Security::ImplicitTls
        } else {
            Security::StartTls
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmtpFault {
    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("could not resolve host: {0}")]
    HostResolution(String),

    #[error("could not connect: {0}")]
    Connection(String),

    #[error("server disconnected unexpectedly: {0}")]
    Disconnected(String),

    #[error("SMTP error: {0}")]
    Protocol(String),

    #[error("unexpected error: {0}")]
    Unclassified(String),
}

impl SmtpFault {
    pub fn level(&self) -> Level {
        match self {
            SmtpFault::Disconnected(_) => Level::Warn,
            SmtpFault::Unclassified(_) => Level::Critical,
            _ => Level::Error,
        }
    }

    fn log_message(&self, msg: &EmailMessage) -> String {
        let server = format!("{}:{}", msg.host, msg.port);
        match self {
            SmtpFault::Authentication(why) => {
                format!("SMTP authentication failed on {}. Error: {}", server, why)
            }
            SmtpFault::HostResolution(why) => format!(
                "Socket/DNS error: Could not connect to SMTP server '{}'. Error: {}",
                msg.host, why
            ),
            SmtpFault::Connection(why) => {
                format!("SMTP connect error for {}. Error: {}", server, why)
            }
            SmtpFault::Disconnected(why) => format!(
                "SMTP server disconnected unexpectedly. Server: {}. Error: {}",
                server, why
            ),
            SmtpFault::Protocol(why) => format!(
                "An SMTP exception occurred while sending email. Error: {}",
                why
            ),
            SmtpFault::Unclassified(why) => format!(
                "An unexpected error occurred while sending email: {}",
                why
            ),
        }
    }
}

/// One open SMTP session.
pub trait SmtpSession {
    fn ehlo(&mut self) -> Result<(), SmtpFault>;
    fn starttls(&mut self) -> Result<(), SmtpFault>;
    fn login(&mut self, user: &str, password: &str) -> Result<(), SmtpFault>;
    fn send(&mut self, message: &EmailMessage) -> Result<(), SmtpFault>;
    fn quit(&mut self) -> Result<(), SmtpFault>;
}

/// Opens SMTP sessions.
pub trait SmtpConnector {
    type Session: SmtpSession;

    fn connect(
        &self,
        host: &str,
        port: u16,
        security: Security,
        timeout: Duration,
    ) -> Result<Self::Session, SmtpFault>;
}

/// Sends `message`, returning `true` only when connecting, authenticating,
/// sending and closing all succeed.
///
/// Failures are logged at the severity of their [`SmtpFault`]; the password
/// is never written to the log and the user name only at debug level.
pub fn send<C: SmtpConnector>(
    connector: &C,
    message: &EmailMessage,
    timeout: Duration,
    logger: &Logger,
) -> bool {
    logger.info(format!(
        "Initiating email send. Subject: '{}', To: {}, From: {}, Server: {}:{}",
        message.subject, message.to, message.from, message.host, message.port
    ));

    match deliver(connector, message, timeout, logger) {
        Ok(()) => {
            logger.info("Email sent successfully!".to_string());
            true
        }
        Err(why) => {
            logger.log(why.level(), why.log_message(message));
            println!("Failed to send email: {}", why);
            false
        }
    }
}

fn deliver<C: SmtpConnector>(
    connector: &C,
    message: &EmailMessage,
    timeout: Duration,
    logger: &Logger,
) -> Result<(), SmtpFault> {
    let security = Security::for_port(message.port);
    logger.debug(format!(
        "Connecting to SMTP server {}:{} using {}.",
        message.host, message.port, security
    ));

    let mut session = connector.connect(&message.host, message.port, security, timeout)?;

    if security == Security::StartTls {
        session.ehlo()?;
        session.starttls()?;
        session.ehlo()?;
    }

    logger.debug(format!(
        "Logging into SMTP server with user: {}.",
        message.user
    ));
    session.login(&message.user, &message.password)?;

    logger.info(format!("Sending email to {}.", message.to));
    session.send(message)?;
    session.quit()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Stage {
    Connect,
    Login,
    Session,
}

/// 依照失敗的階段分類 lettre 的錯誤
fn classify(stage: Stage, why: smtp::Error) -> SmtpFault {
    let detail = error_chain(&why);

    // lettre 的 read_response 讀到 EOF 時不回傳 io 錯誤，而是 response("incomplete response")
    if why.is_response() && detail.contains("incomplete response") {
        return SmtpFault::Disconnected(detail);
    }

    if let Some(kind) = io_error_kind(&why) {
        return match (stage, kind) {
            (Stage::Connect, _) => SmtpFault::Connection(detail),
            (
                _,
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected,
            ) => SmtpFault::Disconnected(detail),
            _ => SmtpFault::Unclassified(detail),
        };
    }

    match stage {
        Stage::Login if why.is_permanent() => SmtpFault::Authentication(detail),
        // 問候訊息不是 220 或無可用位址
        Stage::Connect => SmtpFault::Connection(detail),
        _ if why.is_permanent()
            || why.is_transient()
            || why.is_response()
            || why.is_client()
            || why.is_tls() =>
        {
            SmtpFault::Protocol(detail)
        }
        _ => SmtpFault::Unclassified(detail),
    }
}

fn io_error_kind(why: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = why.source();

    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }

    None
}

/// Opens real SMTP sessions with lettre.
pub struct LettreConnector {
    hello_name: ClientId,
}

impl LettreConnector {
    pub fn new() -> Self {
        util::http::ensure_crypto_provider();

        LettreConnector {
            hello_name: ClientId::default(),
        }
    }
}

impl Default for LettreConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtpConnector for LettreConnector {
    type Session = LettreSession;

    fn connect(
        &self,
        host: &str,
        port: u16,
        security: Security,
        timeout: Duration,
    ) -> Result<LettreSession, SmtpFault> {
        // 先自行解析，才能和連線被拒分開
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|why| SmtpFault::HostResolution(format!("{}: {}", host, why)))?
            .collect();

        if addrs.is_empty() {
            return Err(SmtpFault::HostResolution(format!(
                "{} resolved to no address",
                host
            )));
        }

        let implicit_tls = match security {
            Security::ImplicitTls => Some(tls_parameters(host)?),
            Security::StartTls => None,
        };

        // lettre 連線時已送出第一次 EHLO
        let conn = SmtpConnection::connect(
            addrs.as_slice(),
            Some(timeout),
            &self.hello_name,
            implicit_tls.as_ref(),
            None,
        )
        .map_err(|why| classify(Stage::Connect, why))?;

        Ok(LettreSession {
            conn,
            host: host.to_string(),
            hello_name: self.hello_name.clone(),
            greeted: true,
        })
    }
}

fn tls_parameters(host: &str) -> Result<TlsParameters, SmtpFault> {
    TlsParameters::new(host.to_string())
        .map_err(|why| SmtpFault::Protocol(format!("TLS setup failed: {}", error_chain(&why))))
}

pub struct LettreSession {
    conn: SmtpConnection,
    host: String,
    hello_name: ClientId,
    /// lettre 剛送出 EHLO，伺服器能力清單是最新的
    greeted: bool,
}

impl SmtpSession for LettreSession {
    /// lettre 在連線與 STARTTLS 升級後都會自行送出 EHLO，這裡只確認順序
    fn ehlo(&mut self) -> Result<(), SmtpFault> {
        if !self.greeted {
            return Err(SmtpFault::Protocol(
                "EHLO is only sent after connecting or STARTTLS".to_string(),
            ));
        }

        self.greeted = false;
        Ok(())
    }

    fn starttls(&mut self) -> Result<(), SmtpFault> {
        if !self.conn.can_starttls() {
            return Err(SmtpFault::Protocol(format!(
                "{} does not advertise STARTTLS",
                self.host
            )));
        }

        let tls = tls_parameters(&self.host)?;
        // lettre 升級後會重新送出 EHLO
        self.conn
            .starttls(&tls, &self.hello_name)
            .map_err(|why| classify(Stage::Session, why))?;
        self.greeted = true;

        Ok(())
    }

    fn login(&mut self, user: &str, password: &str) -> Result<(), SmtpFault> {
        let credentials = Credentials::new(user.to_string(), password.to_string());

        self.conn
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .map(|_| ())
            .map_err(|why| classify(Stage::Login, why))
    }

    fn send(&mut self, message: &EmailMessage) -> Result<(), SmtpFault> {
        let from = parse_mailbox("sender", &message.from)?;
        let to = parse_mailbox("recipient", &message.to)?;
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|why| SmtpFault::Protocol(format!("Failed to build message: {}", why)))?;

        self.conn
            .send(email.envelope(), &email.formatted())
            .map(|_| ())
            .map_err(|why| classify(Stage::Session, why))
    }

    fn quit(&mut self) -> Result<(), SmtpFault> {
        self.conn
            .quit()
            .map(|_| ())
            .map_err(|why| classify(Stage::Session, why))
    }
}

fn parse_mailbox(role: &str, address: &str) -> Result<Mailbox, SmtpFault> {
    address
        .parse::<Mailbox>()
        .map_err(|why| SmtpFault::Protocol(format!("Invalid {} '{}': {}", role, address, why)))
}

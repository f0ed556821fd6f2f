use std::{
    env,
    fmt::Write as _,
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    thread::{self, JoinHandle},
};

use anyhow::Result;
use chrono::{format::DelayedFormat, DateTime, Local};
use crossbeam_channel::{unbounded, Sender};
use strum::{Display, EnumString};

const LOG_FILE: &str = "LOG_FILE";
const LOG_LEVEL: &str = "LOG_LEVEL";
const DEFAULT_LOG_FILE: &str = "stock_fetcher.log";

/// 寫入前累積的最大位元組數
const BATCH_BYTES: usize = 4096;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Level {
    Debug,
    Info,
    #[strum(to_string = "WARN", serialize = "WARNING")]
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

/// Append-only log sink shared by reference for the lifetime of a run.
///
/// Records are handed to a background thread over a channel; dropping the
/// logger closes the channel and waits for the pending lines to be written.
pub struct Logger {
    writer: Option<Sender<LogMessage>>,
    worker: Option<JoinHandle<()>>,
    level: Level,
}

impl Logger {
    /// Builds the run's logger from `LOG_FILE` and `LOG_LEVEL`.
    pub fn from_env() -> Self {
        let path = env::var(LOG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_FILE));
        let level = env::var(LOG_LEVEL)
            .ok()
            .and_then(|l| Level::from_str(l.trim()).ok())
            .unwrap_or(Level::Info);

        Self::init(&path, level)
    }

    /// Opens `path` for appending, falling back to the console when the file
    /// can't be opened.
    pub fn init(path: &Path, level: Level) -> Self {
        match Self::file(path, level) {
            Ok(logger) => logger,
            Err(why) => {
                error_console(format!(
                    "Could not open {} for writing because {:?}. Logging to console only for this session.",
                    path.display(),
                    why
                ));
                let logger = Self::console(level);
                logger.warn(format!(
                    "File logger failed to initialize ({}). Using console logging.",
                    path.display()
                ));
                logger
            }
        }
    }

    pub fn file(path: &Path, level: Level) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self::spawn(level, BufWriter::new(file)))
    }

    pub fn console(level: Level) -> Self {
        Self::spawn(level, io::stderr())
    }

    /// A logger whose records are delivered to the returned receiver instead
    /// of being written anywhere.
    #[cfg(test)]
    pub fn channel(level: Level) -> (Self, crossbeam_channel::Receiver<LogMessage>) {
        let (tx, rx) = unbounded::<LogMessage>();
        let logger = Logger {
            writer: Some(tx),
            worker: None,
            level,
        };

        (logger, rx)
    }

    fn spawn<W: Write + Send + 'static>(level: Level, mut out: W) -> Self {
        let (tx, rx) = unbounded::<LogMessage>();

        // 寫入檔案的操作使用另一個線程處理
        let worker = thread::spawn(move || {
            let mut line = String::with_capacity(BATCH_BYTES);

            for received in &rx {
                if writeln!(
                    &mut line,
                    "{} {} {}",
                    received.created_at.format("%F %X%.6f"),
                    received.level,
                    received.msg
                )
                .is_err()
                {
                    continue;
                }

                if rx.is_empty() || line.len() >= BATCH_BYTES {
                    write_batch(&mut out, &mut line);
                }
            }

            if !line.is_empty() {
                write_batch(&mut out, &mut line);
            }
        });

        Logger {
            writer: Some(tx),
            worker: Some(worker),
            level,
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn log(&self, level: Level, msg: String) {
        if !self.enabled(level) {
            return;
        }

        if let Some(writer) = &self.writer {
            if let Err(why) = writer.send(LogMessage::new(level, msg)) {
                error_console(why.to_string());
            }
        }
    }

    pub fn debug(&self, log: String) {
        self.log(Level::Debug, log);
    }

    pub fn info(&self, log: String) {
        self.log(Level::Info, log);
    }

    pub fn warn(&self, log: String) {
        self.log(Level::Warn, log);
    }

    pub fn error(&self, log: String) {
        self.log(Level::Error, log);
    }

    pub fn critical(&self, log: String) {
        self.log(Level::Critical, log);
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        drop(self.writer.take());

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error_console("The log writer thread panicked.".to_string());
            }
        }
    }
}

fn write_batch<W: Write>(out: &mut W, line: &mut String) {
    if let Err(why) = out.write_all(line.as_bytes()) {
        error_console(format!(
            "Failed to write to log sink. because:{:#?}\r\nmsg:{}",
            why, line
        ));
    }

    if let Err(why) = out.flush() {
        error_console(format!("Failed to flush log sink. because:{:#?}", why));
    }

    line.clear();
}

pub fn error_console(log: String) {
    eprintln!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}

#[cfg(test)]
mod tests {
    use std::{process, time::SystemTime};

    use super::*;

    fn temp_log_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        env::temp_dir().join(format!("{}_{}_{}.log", name, process::id(), nanos))
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!(Level::from_str("info").unwrap(), Level::Info);
        assert_eq!(Level::from_str("Warning").unwrap(), Level::Warn);
        assert_eq!(Level::from_str("CRITICAL").unwrap(), Level::Critical);
        assert!(Level::from_str("verbose").is_err());
        assert_eq!(Level::Warn.to_string(), "WARN");
        assert_eq!(Level::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_records_below_level_are_discarded() {
        let (logger, rx) = Logger::channel(Level::Info);
        logger.debug("hidden".to_string());
        logger.info("shown".to_string());
        logger.critical("also shown".to_string());
        drop(logger);

        let records: Vec<LogMessage> = rx.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[0].msg, "shown");
        assert_eq!(records[1].level, Level::Critical);
    }

    #[test]
    fn test_file_logger_appends_on_drop() {
        let path = temp_log_path("stock_fetcher_logging");

        let logger = Logger::file(&path, Level::Debug).unwrap();
        logger.info("first run".to_string());
        drop(logger);

        let logger = Logger::file(&path, Level::Debug).unwrap();
        logger.error("second run".to_string());
        drop(logger);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO first run"));
        assert!(lines[1].ends_with("ERROR second run"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_init_falls_back_to_console() {
        // 目錄無法當作檔案開啟
        let logger = Logger::init(&env::temp_dir(), Level::Info);
        assert!(logger.enabled(Level::Warn));
        assert!(!logger.enabled(Level::Debug));
    }
}

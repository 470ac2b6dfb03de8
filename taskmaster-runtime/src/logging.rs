//! Structured logger with rotating file output and optional email alerting.
//!
//! An explicit handle rather than a global/thread-local singleton: the
//! engine owns one `LoggerHandle` and hands clones to the shell and
//! dashboard at construction time.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Maximum log file size before rotation (10 MiB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated backups to keep.
const MAX_ROTATED_LOGS: u32 = 5;

/// Shifts `taskmaster.log` -> `.1` -> `.2` ... `.5`, dropping the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// SMTP destination consumed from the `EMAIL_*` environment variables.
/// Alerts are disabled unless every required field is set.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    pub to_addrs: Vec<String>,
}

impl EmailConfig {
    /// Reads `EMAIL_SMTP_SERVER`, `EMAIL_SMTP_PORT`, `EMAIL_USERNAME`,
    /// `EMAIL_PASSWORD`, `EMAIL_FROM`, `EMAIL_TO` (comma-separated).
    /// Returns `None` if any required field is absent.
    pub fn from_env() -> Option<Self> {
        let smtp_server = std::env::var("EMAIL_SMTP_SERVER").ok()?;
        let username = std::env::var("EMAIL_USERNAME").ok()?;
        let password = std::env::var("EMAIL_PASSWORD").ok()?;
        let from_addr = std::env::var("EMAIL_FROM").ok()?;
        let to_addrs: Vec<String> = std::env::var("EMAIL_TO")
            .ok()?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if to_addrs.is_empty() {
            return None;
        }
        let smtp_port = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);

        Some(EmailConfig {
            smtp_server,
            smtp_port,
            username,
            password,
            from_addr,
            to_addrs,
        })
    }
}

/// Severity of a process-lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warn,
    Critical,
}

/// Logger handle threaded through the engine and control surfaces.
///
/// Cloning is cheap: the subscriber is a process-wide `tracing` sink
/// installed once in [`LoggerHandle::init`]; clones just share the email
/// config and keep the non-blocking writer's guard alive.
#[derive(Clone)]
pub struct LoggerHandle {
    email: Option<EmailConfig>,
    _guard: Arc<tracing_appender::non_blocking::WorkerGuard>,
}

impl LoggerHandle {
    /// Installs the process-wide tracing subscriber: a rotating file
    /// writer plus a stdout echo, and returns a handle carrying the
    /// optional email alert configuration.
    pub fn init(log_path: &Path, email: Option<EmailConfig>) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        rotate_log_if_needed(log_path);

        let dir = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = log_path.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no file name")
        })?;
        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Errors installing a second global subscriber are ignored so tests
        // that construct multiple engines in one process do not panic.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stdout))
            .try_init();

        Ok(LoggerHandle {
            email,
            _guard: Arc::new(guard),
        })
    }

    /// Logs a process lifecycle event at the given severity, firing an
    /// email alert for `Critical` events when configured.
    ///
    /// A graceful stop logs at `Info`; only a forced kill escalation or
    /// retry exhaustion warrants `Warn`/`Critical`.
    pub fn log_process_event(&self, program: &str, level: AlertLevel, message: &str) {
        match level {
            AlertLevel::Info => tracing::info!(program, "{message}"),
            AlertLevel::Warn => tracing::warn!(program, "{message}"),
            AlertLevel::Critical => {
                tracing::error!(program, "{message}");
                if let Some(cfg) = &self.email {
                    if let Err(e) = send_email_alert(cfg, program, message) {
                        tracing::warn!(program, "failed to send email alert: {e}");
                    }
                }
            }
        }
    }
}

/// Sends a minimal plain-text SMTP alert: a small hand-rolled exchange
/// over `TcpStream`, AUTH LOGIN only, no STARTTLS upgrade.
fn send_email_alert(cfg: &EmailConfig, program: &str, message: &str) -> std::io::Result<()> {
    let mut stream = TcpStream::connect((cfg.smtp_server.as_str(), cfg.smtp_port))?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    read_reply(&mut stream)?;
    send_line(&mut stream, &format!("EHLO {}", cfg.from_addr))?;
    read_reply(&mut stream)?;

    send_line(&mut stream, "AUTH LOGIN")?;
    read_reply(&mut stream)?;
    send_line(&mut stream, &base64_encode(cfg.username.as_bytes()))?;
    read_reply(&mut stream)?;
    send_line(&mut stream, &base64_encode(cfg.password.as_bytes()))?;
    read_reply(&mut stream)?;

    send_line(&mut stream, &format!("MAIL FROM:<{}>", cfg.from_addr))?;
    read_reply(&mut stream)?;
    for to in &cfg.to_addrs {
        send_line(&mut stream, &format!("RCPT TO:<{to}>"))?;
        read_reply(&mut stream)?;
    }

    send_line(&mut stream, "DATA")?;
    read_reply(&mut stream)?;
    let body = format!(
        "Subject: Taskmaster Alert - {program}\r\n\
         From: {from}\r\n\
         To: {to}\r\n\
         \r\n\
         Program '{program}': {message}\r\n.",
        from = cfg.from_addr,
        to = cfg.to_addrs.join(", "),
    );
    send_line(&mut stream, &body)?;
    read_reply(&mut stream)?;

    send_line(&mut stream, "QUIT")?;
    let _ = read_reply(&mut stream);
    Ok(())
}

fn send_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\r\n")
}

fn read_reply(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = [0u8; 512];
    let n = stream.read(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf[..n]).to_string())
}

/// Minimal base64 encoder for AUTH LOGIN credentials.
fn base64_encode(input: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();

        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(match b1 {
            Some(b1) => ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char,
            None => '=',
        });
        out.push(match b2 {
            Some(b2) => ALPHABET[(b2 & 0x3f) as usize] as char,
            None => '=',
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_encodes_known_vectors() {
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn email_config_requires_all_fields() {
        for key in [
            "EMAIL_SMTP_SERVER",
            "EMAIL_USERNAME",
            "EMAIL_PASSWORD",
            "EMAIL_FROM",
            "EMAIL_TO",
        ] {
            std::env::remove_var(key);
        }
        assert!(EmailConfig::from_env().is_none());
    }

    #[test]
    fn rotate_log_if_needed_is_noop_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskmaster.log");
        std::fs::write(&path, b"small").unwrap();
        rotate_log_if_needed(&path);
        assert!(path.exists());
        assert!(!dir.path().join("taskmaster.log.1").exists());
    }
}

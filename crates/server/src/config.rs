use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use survey_mailer::MailConfig;

pub const DEFAULT_ADMIN_TOKEN: &str = "change-me";

#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub admin_token: String,
    pub cors_origin: CorsOrigin,
    pub db_file: PathBuf,
    pub store_timeout_ms: u64,
    pub admin_dir: PathBuf,
    pub trust_forwarded_for: bool,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigin {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("admin_token", &"<redacted>")
            .field("cors_origin", &self.cors_origin)
            .field("db_file", &self.db_file)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("admin_dir", &self.admin_dir)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("mail", &self.mail)
            .finish()
    }
}

impl ServerConfig {
    /// Reads `SURVEY_CONFIG_PATH` (KEY=VALUE lines) if set, then overlays the
    /// process environment.
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("SURVEY_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let host = match non_empty(kv, "HOST") {
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Some(raw) => raw.parse::<IpAddr>().map_err(|_| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "HOST must be an IP address".to_string(),
            })?,
        };
        let port = parse_u16(kv.get("PORT"), 4000, "PORT")?;

        let admin_token = kv
            .get("ADMIN_TOKEN")
            .map(|s| s.trim())
            .unwrap_or(DEFAULT_ADMIN_TOKEN)
            .to_string();
        if admin_token.is_empty() {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "ADMIN_TOKEN must be non-empty".to_string(),
            });
        }

        let cors_origin = parse_cors_origin(kv.get("CORS_ORIGIN"))?;

        let db_file = PathBuf::from(non_empty(kv, "DB_FILE").unwrap_or("data/responses.db"));
        let store_timeout_ms =
            parse_u64(kv.get("STORE_TIMEOUT_MS"), 2000, "STORE_TIMEOUT_MS")?;
        if store_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "STORE_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        let admin_dir = PathBuf::from(non_empty(kv, "ADMIN_DIR").unwrap_or("public/admin"));
        let trust_forwarded_for =
            parse_bool(kv.get("TRUST_FORWARDED_FOR"), false, "TRUST_FORWARDED_FOR")?;

        let mail = parse_mail_config(kv)?;

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            admin_token,
            cors_origin,
            db_file,
            store_timeout_ms,
            admin_dir,
            trust_forwarded_for,
            mail,
        })
    }

    pub fn uses_default_admin_token(&self) -> bool {
        self.admin_token == DEFAULT_ADMIN_TOKEN
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_lines(&contents)
}

fn parse_env_lines(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn non_empty<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_u16(value: Option<&String>, default: u16, key: &'static str) -> Result<u16, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u16>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a port number", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_bool(value: Option<&String>, default: bool, key: &'static str) -> Result<bool, StartupError> {
    let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be true or false", key),
        }),
    }
}

fn parse_cors_origin(value: Option<&String>) -> Result<CorsOrigin, StartupError> {
    let raw = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("*");

    if raw == "*" {
        return Ok(CorsOrigin::Any);
    }

    let mut origins = Vec::new();
    for origin in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if HeaderValue::from_str(origin).is_err() {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!("CORS_ORIGIN entry is not a valid origin: {}", origin),
            });
        }
        origins.push(origin.to_string());
    }

    if origins.is_empty() {
        return Ok(CorsOrigin::Any);
    }
    Ok(CorsOrigin::List(origins))
}

/// Mail is available only when host, port, user and password are all present.
fn parse_mail_config(kv: &HashMap<String, String>) -> Result<Option<MailConfig>, StartupError> {
    let (Some(host), Some(port), Some(user), Some(password)) = (
        non_empty(kv, "SMTP_HOST"),
        non_empty(kv, "SMTP_PORT"),
        non_empty(kv, "SMTP_USER"),
        non_empty(kv, "SMTP_PASS"),
    ) else {
        return Ok(None);
    };

    let port = port.parse::<u16>().map_err(|_| StartupError {
        code: "ERR_INVALID_CONFIG",
        message: "SMTP_PORT must be a port number".to_string(),
    })?;
    let secure = parse_bool(kv.get("SMTP_SECURE"), false, "SMTP_SECURE")?;
    let from = non_empty(kv, "FROM_EMAIL").unwrap_or(user).to_string();
    let timeout_ms = parse_u64(kv.get("MAIL_TIMEOUT_MS"), 10_000, "MAIL_TIMEOUT_MS")?;

    Ok(Some(MailConfig {
        host: host.to_string(),
        port,
        user: user.to_string(),
        password: password.to_string(),
        secure,
        from,
        timeout: Duration::from_millis(timeout_ms.max(1)),
    }))
}

//! Minimal runtime configuration helpers.
//! Defaults target the hosted backend used in production.

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, path::Path};

pub const DEFAULT_OTP_API_BASE_URL: &str = "https://smart-home-backend-eta.vercel.app";
pub const DEFAULT_SESSION_FILE: &str = ".switchhub-session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SCAN_WARMUP_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Project URL of the hosted database, e.g. `https://xyz.supabase.co`.
    pub supabase_url: String,
    /// Public anon key sent with every REST call.
    pub supabase_anon_key: String,
    /// Base URL of the OTP issuing/verification backend.
    pub otp_api_base_url: String,
    /// Where the signed-in user profile is cached between runs.
    pub session_file: PathBuf,
    /// Deadline applied to every outbound HTTP call.
    pub request_timeout: Duration,
    /// Decode cadence while scanning.
    pub scan_interval: Duration,
    /// Delay between switching the capture source on and the first decode.
    pub scan_warmup: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let supabase_url = match lookup("SUPABASE_URL") {
            Some(v) if !v.trim().is_empty() => v.trim().trim_end_matches('/').to_string(),
            _ => return Err("Missing SUPABASE_URL".to_string()),
        };
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(format!("SUPABASE_URL must be an http(s) URL, got {}", supabase_url));
        }

        // Prefer env var; fallback to anon_key.txt in working directory
        let supabase_anon_key = match lookup("SUPABASE_ANON_KEY") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => {
                let path = Path::new("anon_key.txt");
                match fs::read_to_string(path) {
                    Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
                    _ => {
                        return Err(
                            "Missing anon key: set SUPABASE_ANON_KEY or provide anon_key.txt in working directory"
                                .to_string(),
                        );
                    }
                }
            }
        };

        let otp_api_base_url = lookup("OTP_API_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_OTP_API_BASE_URL.to_string());

        let session_file = lookup("SESSION_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        let request_timeout_secs = parse_positive(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let scan_interval_ms = parse_positive(&lookup, "SCAN_INTERVAL_MS", DEFAULT_SCAN_INTERVAL_MS)?;
        let scan_warmup_ms = match lookup("SCAN_WARMUP_MS") {
            Some(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<u64>()
                .map_err(|_| "SCAN_WARMUP_MS must be a non-negative integer".to_string())?,
            _ => DEFAULT_SCAN_WARMUP_MS,
        };

        Ok(Config {
            supabase_url,
            supabase_anon_key,
            otp_api_base_url,
            session_file,
            request_timeout: Duration::from_secs(request_timeout_secs),
            scan_interval: Duration::from_millis(scan_interval_ms),
            scan_warmup: Duration::from_millis(scan_warmup_ms),
        })
    }
}

/// A `.env` file applied to the process environment before [`Config::from_env`].
#[derive(Debug)]
pub struct EnvFile {
    pub path: PathBuf,
    /// Passed with `--env-file` rather than found in the working directory.
    pub explicit: bool,
}

impl EnvFile {
    /// Resolves the file to load: the explicit path (which must exist), else
    /// `./.env` when present.
    pub fn locate(explicit: Option<PathBuf>) -> Result<Option<EnvFile>, String> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            return Ok(Some(EnvFile { path, explicit: true }));
        }
        let cwd = std::env::current_dir().map_err(|e| format!("cannot resolve working directory: {}", e))?;
        let path = cwd.join(".env");
        Ok(path.is_file().then_some(EnvFile { path, explicit: false }))
    }

    /// Exports every assignment not already present in the environment.
    pub fn apply(&self) -> Result<usize, String> {
        let text =
            fs::read_to_string(&self.path).map_err(|e| format!("cannot read {}: {}", self.path.display(), e))?;
        let mut exported = 0;
        for (n, line) in text.lines().enumerate() {
            let Some((key, value)) =
                parse_env_line(line).map_err(|e| format!("{} line {}: {}", self.path.display(), n + 1, e))?
            else {
                continue;
            };
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // SAFETY: called once from main before any other thread exists.
            unsafe { std::env::set_var(&key, value) };
            exported += 1;
        }
        Ok(exported)
    }
}

/// Parses one `.env` line. Blank lines and comments yield `None`.
fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let Some((key, raw)) = line.split_once('=') else {
        return Err("expected KEY=VALUE".to_string());
    };
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid variable name `{}`", key));
    }
    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => unquote(&raw[1..], q)?,
        _ => raw.split(" #").next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

/// Reads a quoted value up to its closing `quote`. Escapes are honoured
/// only inside double quotes; only a comment may follow.
fn unquote(body: &str, quote: char) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if quote == '"' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c if c == quote => {
                let tail = body[i + 1..].trim();
                return if tail.is_empty() || tail.starts_with('#') {
                    Ok(value)
                } else {
                    Err(format!("trailing text after closing {}", quote))
                };
            }
            c => value.push(c),
        }
    }
    Err(format!("missing closing {}", quote))
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64, String> {
    match lookup(key) {
        Some(s) if !s.trim().is_empty() => match s.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(format!("{} must be a positive integer", key)),
            Ok(v) => Ok(v),
        },
        _ => Ok(default),
    }
}

pub mod models {
    pub mod rows;
}

pub mod cli;
pub mod client;
pub mod config;
pub mod otp;
pub mod session;
pub mod utils;
pub mod services {
    pub mod admin;
    pub mod allocation;
    pub mod auth;
    pub mod claim;
    pub mod devices;
    pub mod homes;
    pub mod labels;
    pub mod prompt;
    pub mod scanner;
    pub mod sharing;
    pub mod switches;
}

#[cfg(test)]
mod test_support;

use crate::cli::{App, Command};
use crate::client::RestClient;
use crate::config::{Config, EnvFile};
use crate::otp::OtpClient;
use crate::session::{Session, SessionStore};
use log::{debug, error, info};
use std::path::PathBuf;

pub fn run(command: Command) -> Result<(), String> {
    let mut stdout = std::io::stdout();

    // Offline commands need neither config nor a session.
    if cli::execute_offline(&command, &mut stdout)? {
        return Ok(());
    }

    // 1) Load config
    let cfg = Config::from_env()?;
    debug!(
        "Config loaded (supabase={}, otp={}, session_file={}, timeout={}s, scan_interval={}ms, scan_warmup={}ms)",
        cfg.supabase_url,
        cfg.otp_api_base_url,
        cfg.session_file.display(),
        cfg.request_timeout.as_secs(),
        cfg.scan_interval.as_millis(),
        cfg.scan_warmup.as_millis()
    );

    // 2) Clients; every call carries the configured deadline
    let store = RestClient::new(&cfg.supabase_url, cfg.supabase_anon_key.clone(), cfg.request_timeout);
    let otp = OtpClient::new(&cfg.otp_api_base_url, cfg.request_timeout);

    // 3) Hydrate the session
    let session = Session::init(SessionStore::new(cfg.session_file.clone()))?;

    // 4) Execute
    let mut app = App::new(store, otp, session, cfg.scan_interval, cfg.scan_warmup);
    app.execute(command, &mut stdout)
}

/// Separates the global `--env-file` option from the command words. The
/// option is only recognised before the first command word.
fn split_args(args: Vec<String>) -> Result<(Option<PathBuf>, Vec<String>), String> {
    let mut env_file = None;
    let mut rest = args.into_iter();
    let mut words = Vec::new();
    while let Some(arg) = rest.next() {
        let path = if arg == "--env-file" {
            rest.next().ok_or("`--env-file` requires a path argument")?
        } else if let Some(p) = arg.strip_prefix("--env-file=") {
            p.to_string()
        } else if arg == "--" {
            break;
        } else {
            words.push(arg);
            break;
        };
        if path.is_empty() {
            return Err("`--env-file` requires a path argument".to_string());
        }
        if env_file.replace(PathBuf::from(path)).is_some() {
            return Err("`--env-file` given more than once".to_string());
        }
    }
    words.extend(rest);
    Ok((env_file, words))
}

fn main() {
    let args: Result<Vec<String>, _> = std::env::args_os().skip(1).map(|a| a.into_string()).collect();
    let Ok(args) = args else {
        eprintln!("fatal: argument contains invalid UTF-8");
        std::process::exit(1);
    };
    let (env_file, words) = match split_args(args) {
        Ok(parts) => parts,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };
    let env_file = match EnvFile::locate(env_file) {
        Ok(found) => found,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };
    let exported = match env_file.as_ref().map(EnvFile::apply).transpose() {
        Ok(n) => n,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG may come from the env file, so the logger starts after it.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    if let (Some(file), Some(n)) = (env_file.as_ref(), exported) {
        debug!(
            "{} variable(s) exported from {} env file {}",
            n,
            if file.explicit { "explicit" } else { "working directory" },
            file.path.display()
        );
    }
    info!(
        "switchhub {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    let command = match Command::parse(&words) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = run(command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

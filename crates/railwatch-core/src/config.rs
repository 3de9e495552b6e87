use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;

use crate::{
    clock::DepartedPolicy, errors::Error, monitor::MonitorSettings, registry::DEFAULT_CAPACITY,
    retry::RetryPolicy, Result,
};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Messaging channel
    pub telegram_bot_token: Option<String>,
    pub telegram_notify_chat_id: Option<i64>,

    // Departure board
    pub darwin_base_url: String,
    pub darwin_access_token: Option<String>,
    pub darwin_board_rows: u32,

    // Persistence
    pub services_file: PathBuf,
    pub cursor_file: PathBuf,

    // Monitor
    pub poll_interval: Duration,
    pub monitor_window: Duration,
    pub delay_threshold: Duration,
    pub registry_capacity: usize,
    pub retry_tries: usize,
    pub departed_policy: DepartedPolicy,
    pub timezone: Tz,

    // External calls
    pub http_timeout: Duration,

    // On-demand endpoint
    pub http_enabled: bool,
    pub http_bind: SocketAddr,

    // Logging
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build a config from any key lookup (the process environment in
    /// production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |key: &str| get(key).and_then(non_empty);
        let u64_of = |key: &str| -> Result<Option<u64>> {
            str_of(key)
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
                })
                .transpose()
        };

        // Messaging (optional: without a token the monitor runs with null collaborators)
        let telegram_bot_token = str_of("TELEGRAM_BOT_TOKEN");
        let telegram_notify_chat_id = str_of("TELEGRAM_NOTIFY_CHAT_ID")
            .map(|s| {
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| Error::Config("TELEGRAM_NOTIFY_CHAT_ID must be a chat id".to_string()))
            })
            .transpose()?;
        if telegram_bot_token.is_some() && telegram_notify_chat_id.is_none() {
            return Err(Error::Config(
                "TELEGRAM_NOTIFY_CHAT_ID is required when TELEGRAM_BOT_TOKEN is set".to_string(),
            ));
        }

        // Departure board
        let darwin_base_url = str_of("DARWIN_BASE_URL")
            .unwrap_or_else(|| "https://huxley2.azurewebsites.net".to_string())
            .trim_end_matches('/')
            .to_string();
        let darwin_access_token = str_of("DARWIN_ACCESS_TOKEN");
        let darwin_board_rows = u64_of("DARWIN_BOARD_ROWS")?.unwrap_or(10).clamp(1, 150) as u32;

        // Persistence
        let services_file = str_of("SERVICES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("trains_to_monitor.txt"));
        let cursor_file = str_of("CURSOR_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("most_recent_message_id.txt"));

        // Monitor
        let poll_interval = Duration::from_secs(u64_of("POLL_INTERVAL_SECS")?.unwrap_or(120).max(1));
        let monitor_window = Duration::from_secs(u64_of("MONITOR_WINDOW_SECS")?.unwrap_or(1800));
        let delay_threshold = Duration::from_secs(u64_of("DELAY_THRESHOLD_SECS")?.unwrap_or(180));
        let registry_capacity = u64_of("REGISTRY_CAPACITY")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CAPACITY);
        if registry_capacity == 0 {
            return Err(Error::Config("REGISTRY_CAPACITY must be at least 1".to_string()));
        }
        let retry_tries = u64_of("RETRY_TRIES")?.map(|v| v as usize).unwrap_or(2);
        if retry_tries == 0 {
            return Err(Error::Config("RETRY_TRIES must be at least 1".to_string()));
        }
        let departed_policy = match str_of("DEPARTED_POLICY") {
            Some(s) => s.parse::<DepartedPolicy>()?,
            None => DepartedPolicy::default(),
        };
        let timezone = str_of("TIMEZONE")
            .unwrap_or_else(|| "Europe/London".to_string())
            .trim()
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("invalid TIMEZONE: {e}")))?;

        // External calls
        let http_timeout = Duration::from_millis(u64_of("HTTP_TIMEOUT_MS")?.unwrap_or(10_000));

        // On-demand endpoint
        let http_enabled = str_of("HTTP_ENABLED").map(|s| parse_bool(&s)).unwrap_or(true);
        let http_bind = str_of("HTTP_BIND")
            .unwrap_or_else(|| "0.0.0.0:5000".to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid HTTP_BIND: {e}")))?;

        let log_file = str_of("LOG_FILE").map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            telegram_notify_chat_id,
            darwin_base_url,
            darwin_access_token,
            darwin_board_rows,
            services_file,
            cursor_file,
            poll_interval,
            monitor_window,
            delay_threshold,
            registry_capacity,
            retry_tries,
            departed_policy,
            timezone,
            http_timeout,
            http_enabled,
            http_bind,
            log_file,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_tries)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.poll_interval,
            window: self.monitor_window,
            delay_threshold: self.delay_threshold,
            departed_policy: self.departed_policy,
            retry: self.retry_policy(),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_any_env() {
        let cfg = load(&[]).unwrap();
        assert!(cfg.telegram_bot_token.is_none());
        assert_eq!(cfg.poll_interval, Duration::from_secs(120));
        assert_eq!(cfg.monitor_window, Duration::from_secs(1800));
        assert_eq!(cfg.delay_threshold, Duration::from_secs(180));
        assert_eq!(cfg.registry_capacity, 15);
        assert_eq!(cfg.retry_tries, 2);
        assert_eq!(cfg.departed_policy, DepartedPolicy::NextDay);
        assert_eq!(cfg.timezone, chrono_tz::Europe::London);
        assert!(cfg.http_enabled);
        assert_eq!(cfg.http_bind.port(), 5000);
    }

    #[test]
    fn token_requires_notify_chat() {
        let err = load(&[("TELEGRAM_BOT_TOKEN", "abc")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "abc"),
            ("TELEGRAM_NOTIFY_CHAT_ID", "-100123"),
        ])
        .unwrap();
        assert_eq!(cfg.telegram_notify_chat_id, Some(-100123));
    }

    #[test]
    fn rejects_bad_typed_values() {
        assert!(load(&[("TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(load(&[("DEPARTED_POLICY", "maybe")]).is_err());
        assert!(load(&[("POLL_INTERVAL_SECS", "soon")]).is_err());
        assert!(load(&[("REGISTRY_CAPACITY", "0")]).is_err());
    }

    #[test]
    fn zero_retry_tries_is_rejected() {
        let err = load(&[("RETRY_TRIES", "0")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(load(&[("RETRY_TRIES", "1")]).unwrap().retry_tries, 1);
    }

    #[test]
    fn settings_follow_overrides() {
        let cfg = load(&[
            ("DEPARTED_POLICY", "ignore"),
            ("RETRY_TRIES", "4"),
            ("DARWIN_BASE_URL", "http://localhost:8080/"),
        ])
        .unwrap();
        let s = cfg.monitor_settings();
        assert_eq!(s.departed_policy, DepartedPolicy::Ignore);
        assert_eq!(s.retry.tries, 4);
        assert_eq!(cfg.darwin_base_url, "http://localhost:8080");
    }
}

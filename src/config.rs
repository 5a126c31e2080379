use std::path::PathBuf;
use std::str::FromStr;

use crate::limits::MAX_RECENT_BOOKINGS;

/// Server configuration, read from `INNKEEP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Prometheus exporter port; disabled when unset.
    pub metrics_port: Option<u16>,
    /// WAL records appended before the compactor rewrites the log.
    pub compact_threshold: u64,
    /// Shared bearer token required on every `/api` request when set.
    pub api_token: Option<String>,
    /// Mail relay endpoint; notices are only logged when unset.
    pub notify_webhook: Option<String>,
    pub notify_max_attempts: u32,
    /// Bookings shown on the dashboard.
    pub recent_bookings: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            api_token: None,
            notify_webhook: None,
            notify_max_attempts: 5,
            recent_bookings: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup; unparsable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            bind: non_empty("INNKEEP_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "INNKEEP_PORT").unwrap_or(defaults.port),
            data_dir: non_empty("INNKEEP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "INNKEEP_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "INNKEEP_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            api_token: non_empty("INNKEEP_API_TOKEN"),
            notify_webhook: non_empty("INNKEEP_NOTIFY_WEBHOOK"),
            notify_max_attempts: parsed(&lookup, "INNKEEP_NOTIFY_MAX_ATTEMPTS")
                .unwrap_or(defaults.notify_max_attempts)
                .max(1),
            recent_bookings: parsed(&lookup, "INNKEEP_RECENT_BOOKINGS")
                .unwrap_or(defaults.recent_bookings)
                .min(MAX_RECENT_BOOKINGS),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("innkeep.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from(&[]), Config::default());
        assert_eq!(Config::default().addr(), "0.0.0.0:8080");
    }

    #[test]
    fn reads_every_variable() {
        let cfg = from(&[
            ("INNKEEP_BIND", "127.0.0.1"),
            ("INNKEEP_PORT", "9000"),
            ("INNKEEP_DATA_DIR", "/var/lib/innkeep"),
            ("INNKEEP_METRICS_PORT", "9100"),
            ("INNKEEP_COMPACT_THRESHOLD", "50"),
            ("INNKEEP_API_TOKEN", "s3cret"),
            ("INNKEEP_NOTIFY_WEBHOOK", "http://relay.local/mail"),
            ("INNKEEP_NOTIFY_MAX_ATTEMPTS", "3"),
            ("INNKEEP_RECENT_BOOKINGS", "10"),
        ]);
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/innkeep/innkeep.wal"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.api_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.notify_webhook.as_deref(), Some("http://relay.local/mail"));
        assert_eq!(cfg.notify_max_attempts, 3);
        assert_eq!(cfg.recent_bookings, 10);
    }

    #[test]
    fn junk_and_blank_values_fall_back() {
        let cfg = from(&[
            ("INNKEEP_PORT", "eighty"),
            ("INNKEEP_API_TOKEN", "   "),
            ("INNKEEP_NOTIFY_MAX_ATTEMPTS", "0"),
            ("INNKEEP_RECENT_BOOKINGS", "100000"),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.api_token, None);
        assert_eq!(cfg.notify_max_attempts, 1);
        assert_eq!(cfg.recent_bookings, MAX_RECENT_BOOKINGS);
    }
}

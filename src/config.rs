use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::model::{Ms, ResourcePolicy};

/// Process configuration, read from `SLOTGUARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Journal file name inside `data_dir`.
    pub journal: String,
    pub metrics_port: Option<u16>,
    /// Appends since the last compaction that trigger another one.
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
    /// How long cancelled/declined/completed reservations survive compaction.
    pub retention_ms: Ms,
    pub require_approval: bool,
    pub park_contested: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            journal: "slotguard.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
            sweep_interval: Duration::from_secs(30),
            retention_ms: 7 * 24 * 3_600_000,
            require_approval: true,
            park_contested: true,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unset or unparseable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            data_dir: lookup("SLOTGUARD_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            journal: lookup("SLOTGUARD_JOURNAL").unwrap_or(d.journal),
            metrics_port: parsed(&lookup, "SLOTGUARD_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "SLOTGUARD_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            sweep_interval: parsed(&lookup, "SLOTGUARD_SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(d.sweep_interval),
            retention_ms: parsed(&lookup, "SLOTGUARD_RETENTION_MS").unwrap_or(d.retention_ms),
            require_approval: parsed(&lookup, "SLOTGUARD_REQUIRE_APPROVAL").unwrap_or(d.require_approval),
            park_contested: parsed(&lookup, "SLOTGUARD_PARK_CONTESTED").unwrap_or(d.park_contested),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(&self.journal)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_policy: ResourcePolicy {
                requires_approval: self.require_approval,
            },
            park_contested: self.park_contested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.journal_path(), PathBuf::from("./data/slotguard.wal"));
        assert_eq!(cfg.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("SLOTGUARD_DATA_DIR", "/var/lib/slotguard"),
            ("SLOTGUARD_METRICS_PORT", "9100"),
            ("SLOTGUARD_COMPACT_THRESHOLD", "50"),
            ("SLOTGUARD_SWEEP_INTERVAL_SECS", "5"),
            ("SLOTGUARD_REQUIRE_APPROVAL", "false"),
            ("SLOTGUARD_PARK_CONTESTED", "false"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/slotguard"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));

        let settings = cfg.engine_settings();
        assert!(!settings.default_policy.requires_approval);
        assert!(!settings.park_contested);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("SLOTGUARD_METRICS_PORT", "not-a-port"),
            ("SLOTGUARD_COMPACT_THRESHOLD", "-3"),
            ("SLOTGUARD_SWEEP_INTERVAL_SECS", "0"),
            ("SLOTGUARD_REQUIRE_APPROVAL", "maybe"),
        ]));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(30));
        assert!(cfg.require_approval);
    }
}

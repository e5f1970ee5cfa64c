//! Environment defaults for the check CLI.
//!
//! Environment variables:
//! - `RKCHECK_READY_TIMEOUT_SECS`: how long to wait for pods and snapshots to
//!   become ready. Defaults to `300`.
//! - `RKCHECK_POLL_INTERVAL_SECS`: delay between readiness probes. Defaults to `2`.
//! - `RKCHECK_DEFAULT_IMAGE`: container image of the test workloads when
//!   `--image` is not given. Defaults to `busybox:1.36`.
//!
//! Command-line flags take precedence over all of these.

use std::sync::LazyLock;
use std::time::Duration;

use libcsicheck::WaitPolicy;

pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_IMAGE: &str = "busybox:1.36";

pub struct CheckConfig {
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub default_image: String,
}

impl CheckConfig {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            ready_timeout: Duration::from_secs(secs(
                "RKCHECK_READY_TIMEOUT_SECS",
                DEFAULT_READY_TIMEOUT_SECS,
            )),
            // A zero interval would spin against the API server.
            poll_interval: Duration::from_secs(
                secs("RKCHECK_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1),
            ),
            default_image: lookup("RKCHECK_DEFAULT_IMAGE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE.to_owned()),
        }
    }

    /// Wait policy, with the timeout optionally overridden from the command line.
    pub fn wait_policy(&self, timeout_secs: Option<u64>) -> WaitPolicy {
        WaitPolicy {
            timeout: timeout_secs.map_or(self.ready_timeout, Duration::from_secs),
            interval: self.poll_interval,
        }
    }
}

/// Globally initialized check configuration, read from environment variables at first access.
pub static CHECK_CONFIG: LazyLock<CheckConfig> =
    LazyLock::new(|| CheckConfig::from_lookup(|key| std::env::var(key).ok()));

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> CheckConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CheckConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.ready_timeout, Duration::from_secs(300));
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.default_image, "busybox:1.36");
    }

    #[test]
    fn env_overrides_and_garbage() {
        let cfg = config(&[
            ("RKCHECK_READY_TIMEOUT_SECS", "60"),
            ("RKCHECK_POLL_INTERVAL_SECS", "0"),
            ("RKCHECK_DEFAULT_IMAGE", "alpine:3"),
        ]);
        assert_eq!(cfg.ready_timeout, Duration::from_secs(60));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.default_image, "alpine:3");

        let cfg = config(&[("RKCHECK_READY_TIMEOUT_SECS", "soon")]);
        assert_eq!(cfg.ready_timeout, Duration::from_secs(300));
    }

    #[test]
    fn flag_timeout_wins() {
        let cfg = config(&[("RKCHECK_READY_TIMEOUT_SECS", "60")]);
        assert_eq!(cfg.wait_policy(None).timeout, Duration::from_secs(60));
        assert_eq!(cfg.wait_policy(Some(5)).timeout, Duration::from_secs(5));
    }
}

//! Configuration types.

use std::time::Duration;

/// Funnel engine configuration.
///
/// Every value here is deployment policy, not core logic. Defaults mirror a
/// conservative production setup; `from_env` overrides them from the
/// environment.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    /// Skip the intro stage and start leads directly at city selection.
    pub skip_intro: bool,
    /// Maximum consecutive re-prompts per stage visit before escalating to
    /// human handoff.
    pub max_reprompts: u32,
    /// How long a seen message id is remembered. Must exceed the upstream
    /// transport's redelivery window.
    pub dedupe_window: Duration,
    /// Bounded retry count for the read-decide-write cycle on version
    /// conflicts.
    pub cas_max_retries: u32,
    /// Upper bound on any single store call; a timeout is treated as the
    /// store being unavailable.
    pub store_timeout: Duration,
    /// TTL for the fast-tier copy of a lead context.
    pub transient_ttl: Duration,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            skip_intro: false,
            max_reprompts: 2,
            dedupe_window: Duration::from_secs(300), // 5 minutes
            cas_max_retries: 3,
            store_timeout: Duration::from_secs(5),
            transient_ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

impl FunnelConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `FUNNEL_SKIP_INTRO`, `FUNNEL_MAX_REPROMPTS`,
    /// `FUNNEL_DEDUPE_WINDOW_SECS`, `FUNNEL_CAS_MAX_RETRIES`,
    /// `FUNNEL_STORE_TIMEOUT_SECS`, `FUNNEL_TRANSIENT_TTL_DAYS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            skip_intro: env_bool("FUNNEL_SKIP_INTRO", defaults.skip_intro),
            max_reprompts: env_parse("FUNNEL_MAX_REPROMPTS", defaults.max_reprompts),
            dedupe_window: Duration::from_secs(env_parse(
                "FUNNEL_DEDUPE_WINDOW_SECS",
                defaults.dedupe_window.as_secs(),
            )),
            cas_max_retries: env_parse("FUNNEL_CAS_MAX_RETRIES", defaults.cas_max_retries),
            store_timeout: Duration::from_secs(env_parse(
                "FUNNEL_STORE_TIMEOUT_SECS",
                defaults.store_timeout.as_secs(),
            )),
            transient_ttl: Duration::from_secs(
                env_parse("FUNNEL_TRANSIENT_TTL_DAYS", 30u64) * 24 * 3600,
            ),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = FunnelConfig::default();
        assert!(!cfg.skip_intro);
        assert_eq!(cfg.max_reprompts, 2);
        assert_eq!(cfg.dedupe_window, Duration::from_secs(300));
        assert_eq!(cfg.cas_max_retries, 3);
        assert!(cfg.transient_ttl > cfg.dedupe_window);
    }
}

//! Sliding window controller.
//!
//! Resolves the effective limit for a sender from the whitelist and the
//! per-domain overrides, then checks and updates the sender's token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::PolicyBackend;
use super::clock::{Clock, SystemClock};
use super::decision::Decision;
use super::overrides::{MemoryMap, OverrideMap};
use super::registry::TokenRegistry;
use super::sender::SenderKey;
use super::token::Admission;

/// Messages per window for senders without an override.
pub const DEFAULT_LIMIT: u64 = 120;
/// Window length used until one is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);
/// Text appended to deferral replies until one is configured.
pub const DEFAULT_DEFER_MESSAGE: &str = "rate limit exceeded";

/// How decisions are serialized against each other.
///
/// `Serialized` holds the controller lock for a whole decision, so no two
/// decisions ever overlap. `PerSender` only takes the controller lock to
/// snapshot settings and relies on the token lock to keep
/// prune/count/compare/record atomic for each sender, which lets different
/// senders proceed in parallel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    #[default]
    Serialized,
    PerSender,
}

#[derive(Clone)]
struct WindowSettings {
    default_limit: u64,
    interval: Duration,
    defer_message: String,
    whitelist: Arc<dyn OverrideMap>,
    domain_overrides: Arc<dyn OverrideMap>,
}

/// Decides whether a sender may send another message.
pub struct WindowController {
    settings: Mutex<WindowSettings>,
    tokens: Arc<TokenRegistry>,
    clock: Arc<dyn Clock>,
    strategy: LockStrategy,
}

impl WindowController {
    /// Create a controller using the system clock.
    pub fn new(
        whitelist: Arc<dyn OverrideMap>,
        domain_overrides: Arc<dyn OverrideMap>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        Self::with_clock(whitelist, domain_overrides, tokens, Arc::new(SystemClock::new()))
    }

    /// Create a controller reading time from `clock`.
    pub fn with_clock(
        whitelist: Arc<dyn OverrideMap>,
        domain_overrides: Arc<dyn OverrideMap>,
        tokens: Arc<TokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings: Mutex::new(WindowSettings {
                default_limit: DEFAULT_LIMIT,
                interval: DEFAULT_INTERVAL,
                defer_message: DEFAULT_DEFER_MESSAGE.to_string(),
                whitelist,
                domain_overrides,
            }),
            tokens,
            clock,
            strategy: LockStrategy::default(),
        }
    }

    /// Create a controller with empty override maps and a fresh registry.
    pub fn unrestricted() -> Self {
        Self::new(
            Arc::new(MemoryMap::new()),
            Arc::new(MemoryMap::new()),
            Arc::new(TokenRegistry::new()),
        )
    }

    /// Choose how decisions are serialized.
    pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_default_limit(&self, limit: u64) {
        self.settings.lock().default_limit = limit;
    }

    pub fn set_interval(&self, interval: Duration) {
        self.settings.lock().interval = interval;
    }

    /// Set the interval from a number of seconds given as text.
    ///
    /// Fractional values such as `"1.5"` are accepted. Unparsable, negative
    /// or non-finite input is logged and leaves a zero-width window.
    pub fn set_interval_secs(&self, secs: &str) {
        let parsed = secs
            .trim()
            .parse::<f64>()
            .map_err(|e| e.to_string())
            .and_then(|secs| Duration::try_from_secs_f64(secs).map_err(|e| e.to_string()));

        let interval = match parsed {
            Ok(interval) => interval,
            Err(e) => {
                warn!(value = %secs, error = %e, "Failed to parse interval, using zero");
                Duration::ZERO
            }
        };
        self.set_interval(interval);
    }

    pub fn set_defer_message(&self, message: impl Into<String>) {
        self.settings.lock().defer_message = message.into();
    }

    pub fn set_whitelist(&self, whitelist: Arc<dyn OverrideMap>) {
        self.settings.lock().whitelist = whitelist;
    }

    pub fn set_domain_overrides(&self, domain_overrides: Arc<dyn OverrideMap>) {
        self.settings.lock().domain_overrides = domain_overrides;
    }

    pub fn default_limit(&self) -> u64 {
        self.settings.lock().default_limit
    }

    pub fn interval(&self) -> Duration {
        self.settings.lock().interval
    }

    pub fn defer_message(&self) -> String {
        self.settings.lock().defer_message.clone()
    }

    pub fn lock_strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// The shared token registry.
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Decide whether `sender` may send a message to `recipients` recipients.
    ///
    /// Accepted messages are recorded against the sender; deferred ones are not.
    pub fn rate_limit(&self, sender: &str, recipients: u64) -> Decision {
        let key = SenderKey::new(sender);

        let recipients = if recipients == 0 {
            debug!(sender = %key, "Recipient count is 0, counting as 1");
            1
        } else {
            recipients
        };

        match self.strategy {
            LockStrategy::Serialized => {
                let settings = self.settings.lock();
                self.decide(&settings, &key, recipients)
            }
            LockStrategy::PerSender => {
                let settings = self.settings.lock().clone();
                self.decide(&settings, &key, recipients)
            }
        }
    }

    /// Drop tokens that have seen no traffic within the current window.
    ///
    /// Returns the number of tokens removed.
    pub fn sweep_idle(&self) -> usize {
        let settings = self.settings.lock();
        let cutoff = window_cutoff(self.clock.now(), settings.interval);

        match self.strategy {
            LockStrategy::Serialized => self.tokens.evict_idle(cutoff),
            LockStrategy::PerSender => {
                drop(settings);
                self.tokens.evict_idle(cutoff)
            }
        }
    }

    fn decide(&self, settings: &WindowSettings, key: &SenderKey, recipients: u64) -> Decision {
        if settings.whitelist.contains(&key.address) {
            debug!(sender = %key, "Allowing whitelisted sender");
            return Decision::Permit;
        }
        if settings.whitelist.contains(&key.domain) {
            debug!(sender = %key, domain = %key.domain, "Allowing whitelisted domain");
            return Decision::Permit;
        }

        let limit = resolve_limit(settings, &key.domain);
        let token = self.tokens.get_or_create(&key.address);

        let now = self.clock.now();
        let cutoff = window_cutoff(now, settings.interval);

        match token.admit(cutoff, now, recipients, limit) {
            Admission::Rejected { projected } => {
                info!(
                    sender = %key,
                    limit = limit,
                    projected = projected,
                    "Message deferred, rate limit reached"
                );
                Decision::Defer(settings.defer_message.clone())
            }
            Admission::Admitted { count } => {
                debug!(
                    sender = %key,
                    recipients = recipients,
                    count = count,
                    limit = limit,
                    "Message accepted"
                );
                Decision::Permit
            }
        }
    }
}

impl PolicyBackend for WindowController {
    fn check(&self, sender: &str, recipients: u64) -> Decision {
        self.rate_limit(sender, recipients)
    }
}

/// Effective limit for a domain. An override that is not a number denies.
fn resolve_limit(settings: &WindowSettings, domain: &str) -> u64 {
    let Some(value) = settings.domain_overrides.get(domain) else {
        return settings.default_limit;
    };

    match value.trim().parse::<u64>() {
        Ok(limit) => limit,
        Err(e) => {
            warn!(
                domain = %domain,
                value = %value,
                error = %e,
                "Cannot parse domain limit, denying"
            );
            0
        }
    }
}

/// Start of the window ending at `now`.
fn window_cutoff(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(interval)
        .ok()
        .and_then(|interval| now.checked_sub_signed(interval))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

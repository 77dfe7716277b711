//! Reconnect policy: exponential backoff with jitter, and the ban gate.
//!
//! When the socket drops without the caller asking for it, the driver asks
//! the [`ReconnectController`] what to do next:
//!
//! - **Retry** after a delay. Delays start at `initial_delay` and grow by
//!   `multiplier` per failure up to `max_delay`, with uniform jitter of
//!   `± jitter_ratio` so a fleet of clients dropped by the same outage
//!   doesn't reconnect in lockstep.
//! - **Stop** once the failures of the current streak have spanned more
//!   than `total_timeout`, or the server closed with a policy code.
//! - **Await a token** if a ban or unban notice arrived just before the
//!   close. The server is about to revoke the current token, so retrying
//!   with it is pointless; the next attempt waits for the login
//!   collaborator to supply a fresh one.
//!
//! A successful connect ends the streak and resets the delay.

use std::time::{Duration, Instant};

use rand::Rng;

// ---------------------------------------------------------------------------
// ReconnectConfig
// ---------------------------------------------------------------------------

/// Tuning for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Set to `false` to never reconnect automatically.
    pub enabled: bool,
    /// Delay before the first retry. Default: 1 second.
    pub initial_delay: Duration,
    /// Upper bound for the (pre-jitter) delay. Default: 30 seconds.
    pub max_delay: Duration,
    /// How long a streak of failures may last before giving up.
    /// Default: 60 seconds.
    pub total_timeout: Duration,
    /// Growth factor per failure. Default: 2.0.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.0–1.0). Default: 0.25.
    pub jitter_ratio: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            total_timeout: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_ratio: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Smallest accepted `initial_delay`.
    pub const MIN_DELAY: Duration = Duration::from_millis(10);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `initial_delay` at least [`Self::MIN_DELAY`].
    /// - `max_delay` at least `initial_delay`.
    /// - `multiplier` at least 1.0 (delays never shrink).
    /// - `jitter_ratio` clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if self.initial_delay < Self::MIN_DELAY {
            tracing::warn!(
                initial_delay = ?self.initial_delay,
                "initial_delay below minimum, clamping"
            );
            self.initial_delay = Self::MIN_DELAY;
        }
        if self.max_delay < self.initial_delay {
            self.max_delay = self.initial_delay;
        }
        if !(self.multiplier >= 1.0) {
            tracing::warn!(
                multiplier = self.multiplier,
                "multiplier below 1.0, clamping"
            );
            self.multiplier = 1.0;
        }
        self.jitter_ratio = if self.jitter_ratio.is_nan() {
            0.0
        } else {
            self.jitter_ratio.clamp(0.0, 1.0)
        };
        self
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// The delay schedule for one streak of failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
    streak_started: Option<Instant>,
    attempts: u32,
}

impl Backoff {
    /// Creates a schedule positioned at `initial_delay`.
    pub fn new(config: ReconnectConfig) -> Self {
        let config = config.validated();
        Self {
            current: config.initial_delay,
            config,
            streak_started: None,
            attempts: 0,
        }
    }

    /// The delay the next retry will use, before jitter.
    pub fn base_delay(&self) -> Duration {
        self.current
    }

    /// Retries handed out in the current streak.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a failure at `now` and returns how long to wait before the
    /// next attempt, or `None` if the streak has used up `total_timeout`.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        let started = *self.streak_started.get_or_insert(now);
        if now.saturating_duration_since(started) >= self.config.total_timeout
        {
            return None;
        }

        let base = self.current;
        self.current = base
            .mul_f64(self.config.multiplier)
            .min(self.config.max_delay);
        self.attempts += 1;
        Some(jittered(base, self.config.jitter_ratio))
    }

    /// Ends the streak: the next failure starts over at `initial_delay`.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.streak_started = None;
        self.attempts = 0;
    }
}

/// Spreads `base` uniformly over `base ± base * ratio`.
fn jittered(base: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return base;
    }
    let spread = base.as_secs_f64() * ratio;
    let offset = rand::rng().random_range(-spread..=spread);
    Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
}

// ---------------------------------------------------------------------------
// ReconnectController
// ---------------------------------------------------------------------------

/// Why reconnection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Automatic reconnection is turned off.
    Disabled,
    /// The streak lasted longer than `total_timeout`.
    RetryExhausted,
    /// The server closed with a code that means "don't come back".
    ServerPolicy,
}

/// What to do after losing (or failing to open) the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after this delay.
    Retry(Duration),
    /// Wait for the token-update hook before trying again.
    AwaitToken,
    /// Give up; the session is over.
    Stop(StopReason),
}

/// Decides whether and when to reconnect.
///
/// Owned by the connection driver; every method is a synchronous state
/// update so the policy can be tested without sockets or timers.
#[derive(Debug)]
pub struct ReconnectController {
    backoff: Backoff,
    enabled: bool,
    /// A ban/unban notice arrived; the next close takes the ban path.
    ban_armed: bool,
    /// A fresh token arrived after the notice but before the close.
    token_refreshed: bool,
    /// Disconnected by the ban path, waiting for the token hook.
    awaiting_token: bool,
}

impl ReconnectController {
    /// Creates a controller with no streak in progress.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            backoff: Backoff::new(config),
            ban_armed: false,
            token_refreshed: false,
            awaiting_token: false,
        }
    }

    /// Read-only view of the delay schedule.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Records a ban or unban notice. Arming twice before the close is
    /// the same as arming once.
    pub fn arm_ban(&mut self) {
        if !self.ban_armed {
            tracing::info!("ban notice received, next close waits for a fresh token");
        }
        self.ban_armed = true;
    }

    /// Returns `true` if the next close will take the ban path.
    pub fn is_ban_armed(&self) -> bool {
        self.ban_armed
    }

    /// Returns `true` while disconnected and waiting for a fresh token.
    pub fn is_awaiting_token(&self) -> bool {
        self.awaiting_token
    }

    /// The socket opened: the failure streak is over.
    pub fn on_connected(&mut self) {
        self.backoff.reset();
        self.awaiting_token = false;
    }

    /// The socket closed without the caller asking for it.
    ///
    /// `server_policy` is `true` when the close code says the server ended
    /// the session on purpose.
    pub fn on_unexpected_close(
        &mut self,
        now: Instant,
        server_policy: bool,
    ) -> ReconnectDecision {
        if self.ban_armed {
            // One-shot: the gate fires for this close only.
            self.ban_armed = false;
            self.backoff.reset();
            if std::mem::take(&mut self.token_refreshed) {
                return ReconnectDecision::Retry(Duration::ZERO);
            }
            self.awaiting_token = true;
            return ReconnectDecision::AwaitToken;
        }
        if !self.enabled {
            return ReconnectDecision::Stop(StopReason::Disabled);
        }
        if server_policy {
            return ReconnectDecision::Stop(StopReason::ServerPolicy);
        }
        self.next_retry(now)
    }

    /// A connection attempt failed before the socket opened.
    pub fn on_connect_failed(&mut self, now: Instant) -> ReconnectDecision {
        if !self.enabled {
            return ReconnectDecision::Stop(StopReason::Disabled);
        }
        self.next_retry(now)
    }

    /// The token-update hook fired. Returns `true` if this completes the
    /// ban path and the driver should connect now.
    pub fn on_token_updated(&mut self) -> bool {
        if self.awaiting_token {
            self.awaiting_token = false;
            return true;
        }
        if self.ban_armed {
            self.token_refreshed = true;
        }
        false
    }

    /// The caller disconnected on purpose: forget every pending intent.
    pub fn cancel(&mut self) {
        self.ban_armed = false;
        self.token_refreshed = false;
        self.awaiting_token = false;
        self.backoff.reset();
    }

    fn next_retry(&mut self, now: Instant) -> ReconnectDecision {
        match self.backoff.next_delay(now) {
            Some(delay) => ReconnectDecision::Retry(delay),
            None => ReconnectDecision::Stop(StopReason::RetryExhausted),
        }
    }
}

//! Per-client admission state with automatic reclamation.
//!
//! # Model
//!
//! Every client IP owns one [`TokenBucket`] with capacity `burst` that refills
//! continuously at `rps` tokens per second. The bucket is the GCRA
//! implementation from the Governor crate, which is the continuous form of a
//! token bucket: no fixed windows, so no burst-at-the-boundary artifacts.
//!
//! ```text
//!   get_or_create(ip) ──lock──► HashMap<ip, Visitor { limiter, last_seen }>
//!           │                          ▲
//!           ▼                          │ retain(now - last_seen <= ttl)
//!   Arc<TokenBucket>::allow()     cleanup() ◄── interval tick (background)
//! ```
//!
//! # Locking
//!
//! A single `Mutex` guards the map. It is held for the lookup-or-insert and
//! the `last_seen` refresh only, never across an await point and never for
//! the admission decision itself, which runs on the bucket's own atomic
//! state. Lookup and insert happen under the same guard, so two concurrent
//! first requests from one IP always end up sharing one bucket.
//!
//! # Clocks
//!
//! Both the buckets and the registry read time through a Governor
//! [`Clock`]. Production uses [`DefaultClock`]; tests drive a
//! `FakeRelativeClock` to exercise refill and expiry deterministically.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::runtime::Handle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimitError;
use crate::metrics::{record_visitors_reclaimed, set_active_visitors};

/// Default idle time after which a visitor is forgotten.
pub const DEFAULT_VISITOR_TTL: Duration = Duration::from_secs(180);

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Continuous-refill token bucket for a single client.
pub struct TokenBucket<C: Clock = DefaultClock> {
    limiter: DirectLimiter<C>,
    clock: C,
}

impl<C: Clock + Clone> TokenBucket<C> {
    fn new(quota: Quota, clock: C) -> Self {
        Self {
            limiter: RateLimiter::direct_with_clock(quota, clock.clone()),
            clock,
        }
    }

    /// Refill by elapsed time, then consume one token if available.
    #[inline]
    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Like [`TokenBucket::allow`], but on rejection reports how long until
    /// the next token becomes available.
    pub fn check(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl<C: Clock> fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket").finish_non_exhaustive()
    }
}

/// Admission state tracked for one client IP.
struct Visitor<C: Clock> {
    limiter: Arc<TokenBucket<C>>,
    last_seen: C::Instant,
}

/// Concurrency-safe map from client IP to its [`TokenBucket`].
///
/// Construct once, share through an `Arc`, and call
/// [`VisitorRegistry::spawn_cleanup`] to start periodic reclamation.
/// [`VisitorRegistry::shutdown`] stops the background task.
pub struct VisitorRegistry<C: Clock = DefaultClock> {
    visitors: Mutex<HashMap<String, Visitor<C>>>,
    quota: Quota,
    ttl: Duration,
    clock: C,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl VisitorRegistry<DefaultClock> {
    /// Create a registry on the system clock.
    ///
    /// # Errors
    ///
    /// See [`VisitorRegistry::with_clock`].
    pub fn new(rps: f64, burst: u32, ttl: Duration) -> Result<Self, RateLimitError> {
        Self::with_clock(rps, burst, ttl, DefaultClock::default())
    }
}

impl<C: Clock + Clone> VisitorRegistry<C> {
    /// Create a registry that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::InvalidRps`] unless `rps` is finite and positive
    /// - [`RateLimitError::ZeroBurst`] if `burst` is 0
    /// - [`RateLimitError::ZeroTtl`] if `ttl` is zero
    pub fn with_clock(rps: f64, burst: u32, ttl: Duration, clock: C) -> Result<Self, RateLimitError> {
        let quota = build_quota(rps, burst)?;
        if ttl.is_zero() {
            return Err(RateLimitError::ZeroTtl);
        }

        Ok(Self {
            visitors: Mutex::new(HashMap::new()),
            quota,
            ttl,
            clock,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Visitor<C>>> {
        // The map stays consistent even if a holder panicked mid-operation
        self.visitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the bucket for `ip`, creating it with a full burst on first use.
    ///
    /// Refreshes the visitor's last-seen time. Repeated calls for the same IP
    /// return the same `Arc` until the visitor is reclaimed.
    pub fn get_or_create(&self, ip: &str) -> Arc<TokenBucket<C>> {
        let now = self.clock.now();
        let mut visitors = self.lock();

        if let Some(visitor) = visitors.get_mut(ip) {
            visitor.last_seen = now;
            return Arc::clone(&visitor.limiter);
        }

        let limiter = Arc::new(TokenBucket::new(self.quota, self.clock.clone()));
        visitors.insert(
            ip.to_string(),
            Visitor {
                limiter: Arc::clone(&limiter),
                last_seen: now,
            },
        );
        set_active_visitors(visitors.len());
        debug!(client_ip = %ip, "New visitor registered");

        limiter
    }

    /// Remove every visitor idle for longer than the TTL.
    ///
    /// Returns the number of visitors removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut visitors = self.lock();

        let before = visitors.len();
        visitors.retain(|_, visitor| Duration::from(now.duration_since(visitor.last_seen)) <= ttl);
        let removed = before - visitors.len();

        if removed > 0 {
            record_visitors_reclaimed(removed);
            set_active_visitors(visitors.len());
        }
        removed
    }

    /// Number of tracked visitors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stop the background cleanup task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        debug!("Visitor registry shut down");
    }
}

impl<C> VisitorRegistry<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Start the periodic cleanup task on the current Tokio runtime.
    ///
    /// Returns `false` (and starts nothing) when called outside a runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> bool {
        let Ok(handle) = Handle::try_current() else {
            warn!("No Tokio runtime available, visitor cleanup task not started");
            return false;
        };

        let registry = Arc::clone(self);
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn_on(
            async move {
                let mut ticker = interval(every);
                ticker.tick().await; // Skip the first immediate tick

                loop {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => {
                            debug!("Visitor cleanup task received cancellation signal");
                            break;
                        }
                        _ = ticker.tick() => {
                            let removed = registry.cleanup();
                            if removed > 0 {
                                debug!(removed, remaining = registry.len(), "Reclaimed idle visitors");
                            }
                        }
                    }
                }
            },
            &handle,
        );

        info!(
            interval_secs = every.as_secs(),
            ttl_secs = self.ttl.as_secs(),
            "Visitor cleanup task started"
        );
        true
    }
}

impl<C: Clock + Clone> fmt::Debug for VisitorRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitorRegistry")
            .field("visitors", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Token bucket quota: `burst` capacity, one token every `1 / rps` seconds.
fn build_quota(rps: f64, burst: u32) -> Result<Quota, RateLimitError> {
    if !rps.is_finite() || rps <= 0.0 {
        return Err(RateLimitError::InvalidRps);
    }
    let burst = NonZeroU32::new(burst).ok_or(RateLimitError::ZeroBurst)?;

    let period = Duration::try_from_secs_f64(1.0 / rps).map_err(|_| RateLimitError::InvalidRps)?;
    let quota = Quota::with_period(period).ok_or(RateLimitError::InvalidRps)?;

    Ok(quota.allow_burst(burst))
}

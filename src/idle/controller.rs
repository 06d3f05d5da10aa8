//! Two-phase inactivity countdown.
//!
//! Phase 1 (`CountingDown`) runs silently for the policy's grace window.
//! Phase 2 (`Armed`) shows a per-second countdown of the warn window and then
//! runs the exit action: best-effort sign-out followed by the caller's
//! callback, or navigation to the root route when no callback was given.
//!
//! Both phases live in a single spawned task. Re-arming, cancelling and
//! dropping the controller abort that task and bump a generation counter the
//! task checks before every side effect, so a stale countdown never publishes
//! or fires after the owner moved on. Once a countdown reaches zero its exit
//! action is detached from the task and always runs to the end.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::auth::AuthProvider;

use super::policy::{ActivityKind, IdlePolicy};

/// Route the kiosk returns to when a countdown expires without a callback.
pub const ROOT_ROUTE: &str = "/";

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Where the countdown currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Off,
    CountingDown,
    Armed,
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleStatus {
    pub phase: IdlePhase,
    pub seconds_remaining: u64,
}

impl IdleStatus {
    pub const fn off() -> Self {
        Self {
            phase: IdlePhase::Off,
            seconds_remaining: 0,
        }
    }

    /// Whether the redirect banner should be visible.
    pub fn is_warning(&self) -> bool {
        self.phase == IdlePhase::Armed
    }
}

/// Navigation seam used when the countdown expires without a callback.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

pub type ExpireCallback = Arc<dyn Fn() + Send + Sync>;

/// Terminal action of a countdown.
#[derive(Clone, Default)]
pub struct IdleExit {
    auth: Option<Arc<dyn AuthProvider>>,
    on_expire: Option<ExpireCallback>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl IdleExit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sign_out(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_expire = Some(Arc::new(callback));
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Sign out (failure is only logged), then hand control to the owner.
    pub async fn fire(&self) {
        if let Some(auth) = &self.auth {
            if let Err(e) = auth.sign_out().await {
                warn!("Sign-out on idle expiry failed: {}", e);
            }
        }

        if let Some(callback) = &self.on_expire {
            callback();
        } else if let Some(navigator) = &self.navigator {
            navigator.navigate(ROOT_ROUTE);
        } else {
            debug!("Idle countdown expired with no exit target");
        }
    }
}

impl std::fmt::Debug for IdleExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleExit")
            .field("sign_out", &self.auth.is_some())
            .field("callback", &self.on_expire.is_some())
            .field("navigator", &self.navigator.is_some())
            .finish()
    }
}

struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    closed: bool,
}

/// Per-screen inactivity controller.
///
/// All methods take `&self` so the controller can be shared with the task
/// that forwards activity events (see [`super::IdleGuard`]). Arming spawns a
/// tokio task and therefore needs a running runtime.
pub struct IdleController {
    policy: IdlePolicy,
    exit: IdleExit,
    status_tx: Arc<watch::Sender<IdleStatus>>,
    generation: Arc<AtomicU64>,
    timer: Mutex<TimerSlot>,
    request_pending: AtomicBool,
}

impl IdleController {
    pub fn new(policy: IdlePolicy, exit: IdleExit) -> Self {
        let (status_tx, _) = watch::channel(IdleStatus::off());
        Self {
            policy,
            exit,
            status_tx: Arc::new(status_tx),
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(TimerSlot {
                handle: None,
                closed: false,
            }),
            request_pending: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &IdlePolicy {
        &self.policy
    }

    /// (Re)start phase 1 from the full grace window.
    ///
    /// Any running countdown is aborted first, so calling this repeatedly
    /// never leaves more than one countdown alive.
    pub fn start(&self) {
        let mut slot = self.lock_timer();
        self.abort_locked(&mut slot);

        if slot.closed {
            trace!("Idle controller closed, not arming");
            return;
        }
        if self.is_paused() {
            trace!("Request pending, countdown suspended");
            self.status_tx.send_replace(IdleStatus::off());
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let initial = if self.policy.grace.is_zero() {
            IdleStatus {
                phase: IdlePhase::Armed,
                seconds_remaining: whole_seconds(self.policy.warn),
            }
        } else {
            IdleStatus {
                phase: IdlePhase::CountingDown,
                seconds_remaining: whole_seconds(self.policy.grace),
            }
        };
        self.status_tx.send_replace(initial);

        let countdown = Countdown {
            grace: self.policy.grace,
            warn: self.policy.warn,
            generation,
            current: self.generation.clone(),
            status_tx: self.status_tx.clone(),
            exit: self.exit.clone(),
        };
        slot.handle = Some(tokio::spawn(countdown.run()));
        debug!(
            "Idle countdown armed: grace={:?}, warn={:?}",
            self.policy.grace, self.policy.warn
        );
    }

    /// Feed one interaction. Returns `true` when it restarted the countdown.
    pub fn activity(&self, kind: ActivityKind) -> bool {
        if self.lock_timer().closed {
            trace!("Idle controller closed, ignoring {}", kind);
            return false;
        }
        if !self.policy.is_qualifying(kind) {
            trace!("Ignoring non-qualifying activity: {}", kind);
            return false;
        }
        if self.is_paused() {
            trace!("Ignoring {} while a request is pending", kind);
            return false;
        }
        self.start();
        true
    }

    /// Stop every pending timer and go back to `Off`.
    pub fn cancel(&self) {
        let mut slot = self.lock_timer();
        self.abort_locked(&mut slot);
        self.status_tx.send_replace(IdleStatus::off());
    }

    /// Cancel and refuse any later re-arm. Used when the owning screen goes away.
    pub fn shutdown(&self) {
        let mut slot = self.lock_timer();
        slot.closed = true;
        self.abort_locked(&mut slot);
        self.status_tx.send_replace(IdleStatus::off());
    }

    /// A backend request was dispatched. Waiting on it is not activity.
    pub fn begin_request(&self) {
        self.request_pending.store(true, Ordering::SeqCst);
        if self.policy.pause_while_pending {
            self.cancel();
        }
    }

    /// The outstanding request settled.
    pub fn end_request(&self) {
        self.request_pending.store(false, Ordering::SeqCst);
        if self.policy.pause_while_pending {
            self.start();
        }
    }

    pub fn status(&self) -> IdleStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdleStatus> {
        self.status_tx.subscribe()
    }

    /// Number of live countdown tasks (0 or 1).
    pub fn active_timers(&self) -> usize {
        let slot = self.lock_timer();
        slot.handle
            .as_ref()
            .map_or(0, |handle| usize::from(!handle.is_finished()))
    }

    fn is_paused(&self) -> bool {
        self.policy.pause_while_pending && self.request_pending.load(Ordering::SeqCst)
    }

    fn lock_timer(&self) -> MutexGuard<'_, TimerSlot> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_locked(&self, slot: &mut TimerSlot) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for IdleController {
    fn drop(&mut self) {
        let slot = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for IdleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleController")
            .field("policy", &self.policy)
            .field("status", &self.status())
            .finish()
    }
}

/// State moved into the countdown task.
struct Countdown {
    grace: Duration,
    warn: Duration,
    generation: u64,
    current: Arc<AtomicU64>,
    status_tx: Arc<watch::Sender<IdleStatus>>,
    exit: IdleExit,
}

impl Countdown {
    async fn run(self) {
        if !self.grace.is_zero() && !self.phase(IdlePhase::CountingDown, self.grace).await {
            return;
        }
        if !self.phase(IdlePhase::Armed, self.warn).await {
            return;
        }

        if !self.publish(IdleStatus::off()) {
            return;
        }
        info!("Idle countdown expired, running exit action");
        let exit = self.exit;
        tokio::spawn(async move { exit.fire().await });
    }

    /// Count `total` down in one-second steps. Returns `false` when superseded.
    async fn phase(&self, phase: IdlePhase, total: Duration) -> bool {
        let start = Instant::now();
        let deadline = start + total;
        let mut remaining = whole_seconds(total);
        if !self.publish(IdleStatus {
            phase,
            seconds_remaining: remaining,
        }) {
            return false;
        }

        let mut next_tick = start + ONE_SECOND;
        while next_tick < deadline {
            sleep_until(next_tick).await;
            remaining = remaining.saturating_sub(1);
            if !self.publish(IdleStatus {
                phase,
                seconds_remaining: remaining,
            }) {
                return false;
            }
            next_tick += ONE_SECOND;
        }

        sleep_until(deadline).await;
        self.publish(IdleStatus {
            phase,
            seconds_remaining: 0,
        })
    }

    fn is_live(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn publish(&self, status: IdleStatus) -> bool {
        if !self.is_live() {
            return false;
        }
        self.status_tx.send_replace(status);
        true
    }
}

/// Duration rounded up to whole seconds for display.
fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

//! Idle policy: durations and which interactions count as activity.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Primary idle window used by the chat and case-study screens.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(120);
/// Visible redirect countdown shown once the idle window elapses.
pub const DEFAULT_WARN: Duration = Duration::from_secs(10);

/// A user interaction the kiosk can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Click,
    KeyDown,
    TouchStart,
    MouseMove,
    Scroll,
    /// Edits inside a text input (composition, not submission).
    Typing,
}

impl ActivityKind {
    pub const STRICT: [ActivityKind; 3] = [
        ActivityKind::Click,
        ActivityKind::KeyDown,
        ActivityKind::TouchStart,
    ];

    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Click,
        ActivityKind::KeyDown,
        ActivityKind::TouchStart,
        ActivityKind::MouseMove,
        ActivityKind::Scroll,
        ActivityKind::Typing,
    ];
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Click => "click",
            ActivityKind::KeyDown => "keydown",
            ActivityKind::TouchStart => "touchstart",
            ActivityKind::MouseMove => "mousemove",
            ActivityKind::Scroll => "scroll",
            ActivityKind::Typing => "typing",
        };
        f.write_str(name)
    }
}

/// Configuration of one idle controller instance.
///
/// `grace` is the silent phase-1 window, `warn` the visible countdown that
/// follows it. A zero `grace` gives the flat variant where the visible
/// countdown starts right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlePolicy {
    pub grace: Duration,
    pub warn: Duration,
    pub qualifying: HashSet<ActivityKind>,
    /// Suspend the countdown while a backend request is outstanding and
    /// restart it once the request settles.
    pub pause_while_pending: bool,
}

impl IdlePolicy {
    /// 120 s + 10 s, only click / keydown / touchstart reset the countdown.
    pub fn strict() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            warn: DEFAULT_WARN,
            qualifying: ActivityKind::STRICT.into_iter().collect(),
            pause_while_pending: false,
        }
    }

    /// 120 s + 10 s, pointer movement, scrolling and typing also count.
    pub fn permissive() -> Self {
        Self {
            qualifying: ActivityKind::ALL.into_iter().collect(),
            ..Self::strict()
        }
    }

    /// Single visible countdown of `secs`, restarted after each exchange.
    pub fn flat(secs: u64) -> Self {
        Self {
            grace: Duration::ZERO,
            warn: Duration::from_secs(secs),
            qualifying: ActivityKind::STRICT.into_iter().collect(),
            pause_while_pending: true,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_warn(mut self, warn: Duration) -> Self {
        self.warn = warn;
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = ActivityKind>) -> Self {
        self.qualifying = events.into_iter().collect();
        self
    }

    pub fn with_pause_while_pending(mut self, pause: bool) -> Self {
        self.pause_while_pending = pause;
        self
    }

    pub fn is_qualifying(&self, kind: ActivityKind) -> bool {
        self.qualifying.contains(&kind)
    }

    /// Whether edits inside an input cancel the countdown.
    pub fn typing_resets(&self) -> bool {
        self.is_qualifying(ActivityKind::Typing)
    }
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

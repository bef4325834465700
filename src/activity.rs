//! Lock-free per-worker activity snapshot (§3, §4.5), consumed by metrics
//! and the dashboard at ~2 Hz. All fields are plain atomics; §5 mandates
//! "atomics only (no locks)" for this type.
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Idle = 0,
    Generating = 1,
    Replaying = 2,
    Shrinking = 3,
    Unknown = -1,
}

impl ActivityState {
    fn from_code(code: i32) -> Self {
        match code {
            0 => ActivityState::Idle,
            1 => ActivityState::Generating,
            2 => ActivityState::Replaying,
            3 => ActivityState::Shrinking,
            _ => ActivityState::Unknown,
        }
    }
}

/// The closed set of mutation/generation strategy names (§4.2 table). A
/// worker's "current strategy" is represented as this enum rather than a
/// free-form string so it can live in an `AtomicI32` without a lock —
/// see DESIGN.md for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    None = 0,
    Fresh = 1,
    Interleave = 2,
    Splice = 3,
    Prepend = 4,
    Append = 5,
}

impl StrategyKind {
    fn from_code(code: i32) -> Self {
        match code {
            1 => StrategyKind::Fresh,
            2 => StrategyKind::Interleave,
            3 => StrategyKind::Splice,
            4 => StrategyKind::Prepend,
            5 => StrategyKind::Append,
            _ => StrategyKind::None,
        }
    }

    pub fn as_str(self) -> Option<&'static str> {
        match self {
            StrategyKind::None => None,
            StrategyKind::Fresh => Some("fresh"),
            StrategyKind::Interleave => Some("interleave"),
            StrategyKind::Splice => Some("splice"),
            StrategyKind::Prepend => Some("prepend"),
            StrategyKind::Append => Some("append"),
        }
    }
}

pub struct WorkerActivity {
    state: AtomicI32,
    strategy: AtomicI32,
    corpus_entry_index: AtomicI32,
    shrink_iteration: AtomicI32,
    shrink_limit: AtomicI32,
    last_update: AtomicI64,
}

impl Default for WorkerActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerActivity {
    pub fn new() -> Self {
        let activity = Self {
            state: AtomicI32::new(ActivityState::Idle as i32),
            strategy: AtomicI32::new(StrategyKind::None as i32),
            corpus_entry_index: AtomicI32::new(-1),
            shrink_iteration: AtomicI32::new(0),
            shrink_limit: AtomicI32::new(0),
            last_update: AtomicI64::new(0),
        };
        activity.touch();
        activity
    }

    fn touch(&self) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
        self.last_update.store(now, Ordering::Relaxed);
    }

    pub fn set_idle(&self) {
        self.state.store(ActivityState::Idle as i32, Ordering::Relaxed);
        self.strategy.store(StrategyKind::None as i32, Ordering::Relaxed);
        self.corpus_entry_index.store(-1, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_generating(&self, strategy: StrategyKind) {
        self.state.store(ActivityState::Generating as i32, Ordering::Relaxed);
        self.strategy.store(strategy as i32, Ordering::Relaxed);
        self.touch();
    }

    /// `idx < 0` means "replaying the base draft, not a specific corpus
    /// entry" (§4.5's "Replaying corpus" with no index).
    pub fn set_replaying(&self, idx: i32) {
        self.state.store(ActivityState::Replaying as i32, Ordering::Relaxed);
        self.corpus_entry_index.store(idx, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_shrinking(&self, iteration: i32, limit: i32) {
        self.state.store(ActivityState::Shrinking as i32, Ordering::Relaxed);
        self.shrink_iteration.store(iteration, Ordering::Relaxed);
        self.shrink_limit.store(limit, Ordering::Relaxed);
        self.touch();
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            state: ActivityState::from_code(self.state.load(Ordering::Relaxed)),
            strategy: StrategyKind::from_code(self.strategy.load(Ordering::Relaxed)),
            corpus_entry_index: self.corpus_entry_index.load(Ordering::Relaxed),
            shrink_iteration: self.shrink_iteration.load(Ordering::Relaxed),
            shrink_limit: self.shrink_limit.load(Ordering::Relaxed),
            last_update: self.last_update.load(Ordering::Relaxed),
        }
    }
}

/// A consistent, field-by-field atomic read of a [`WorkerActivity`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub state: ActivityState,
    pub strategy: StrategyKind,
    pub corpus_entry_index: i32,
    pub shrink_iteration: i32,
    pub shrink_limit: i32,
    pub last_update: i64,
}

impl ActivitySnapshot {
    /// `iteration / limit`, defined only when `shrink_limit > 0` (§3
    /// invariant: otherwise there is nothing to divide by).
    pub fn shrink_progress(&self) -> Option<f64> {
        if self.shrink_limit > 0 {
            Some(self.shrink_iteration as f64 / self.shrink_limit as f64)
        } else {
            None
        }
    }

    /// Human-readable status line (§4.5).
    pub fn description(&self) -> String {
        match self.state {
            ActivityState::Generating => match self.strategy.as_str() {
                Some(name) => format!("Generating ({name})"),
                None => "Generating".to_string(),
            },
            ActivityState::Replaying => {
                if self.corpus_entry_index >= 0 {
                    format!("Replaying corpus #{}", self.corpus_entry_index)
                } else {
                    "Replaying corpus".to_string()
                }
            }
            ActivityState::Shrinking => {
                if self.shrink_limit > 0 {
                    let pct = self.shrink_progress().unwrap_or(0.0) * 100.0;
                    format!("Shrinking ({}/{}, {:.0}%)", self.shrink_iteration, self.shrink_limit, pct)
                } else {
                    "Shrinking".to_string()
                }
            }
            ActivityState::Idle => "Idle".to_string(),
            ActivityState::Unknown => "Unknown".to_string(),
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Memory pressure classification driving query strategy. The governor
//! holds one atomic level recomputed from observed heap usage against a
//! configured ceiling; readers pay a single atomic load.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Four-level classification of current heap usage.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Pressure {
    /// Below 50% of the ceiling.
    Low,
    /// 50-75%.
    Medium,
    /// 75-90%.
    High,
    /// 90% and above.
    Critical,
}

impl Pressure {
    fn from_u8(raw: u8) -> Pressure {
        match raw {
            0 => Pressure::Low,
            1 => Pressure::Medium,
            2 => Pressure::High,
            _ => Pressure::Critical,
        }
    }
}

type ThresholdFn = Box<dyn Fn(Pressure) + Send + Sync>;
type ReleaseFn = Box<dyn Fn() + Send + Sync>;

pub struct MemoryGovernor {
    ceiling_bytes: usize,
    level: AtomicU8,
    threshold_hooks: Mutex<Vec<ThresholdFn>>,
    release_hooks: Mutex<Vec<ReleaseFn>>,
}

impl MemoryGovernor {
    pub fn new(ceiling_bytes: usize) -> Self {
        Self {
            ceiling_bytes: ceiling_bytes.max(1),
            level: AtomicU8::new(Pressure::Low as u8),
            threshold_hooks: Mutex::new(Vec::new()),
            release_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Current pressure; a single atomic read.
    #[inline]
    pub fn pressure(&self) -> Pressure {
        Pressure::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Recomputes the level from `in_use_bytes`. Threshold hooks fire on
    /// every level transition, in registration order.
    pub fn observe(&self, in_use_bytes: usize) {
        let next = classify(in_use_bytes, self.ceiling_bytes);
        let prev = self.level.swap(next as u8, Ordering::Relaxed);
        if prev != next as u8 {
            debug!(
                from = ?Pressure::from_u8(prev),
                to = ?next,
                in_use_bytes,
                "memory pressure transition"
            );
            for hook in self.threshold_hooks.lock().iter() {
                hook(next);
            }
        }
    }

    /// Registers a callback fired on every pressure transition.
    pub fn on_threshold(&self, hook: impl Fn(Pressure) + Send + Sync + 'static) {
        self.threshold_hooks.lock().push(Box::new(hook));
    }

    /// Registers a best-effort release action run by [Self::force_release].
    pub fn register_release(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.release_hooks.lock().push(Box::new(hook));
    }

    /// Best-effort release of caches and intermediate buffers.
    pub fn force_release(&self) {
        for hook in self.release_hooks.lock().iter() {
            hook();
        }
    }

    /// Resident set size of the process, when the platform exposes it.
    /// The engine falls back to accounted dataset bytes elsewhere.
    pub fn resident_memory_bytes() -> Option<usize> {
        resident_memory_bytes_impl()
    }
}

fn classify(in_use: usize, ceiling: usize) -> Pressure {
    let percent = (in_use as u128 * 100 / ceiling as u128) as usize;
    if percent < 50 {
        Pressure::Low
    } else if percent < 75 {
        Pressure::Medium
    } else if percent < 90 {
        Pressure::High
    } else {
        Pressure::Critical
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes_impl() -> Option<usize> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: usize = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as usize)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes_impl() -> Option<usize> {
    None
}

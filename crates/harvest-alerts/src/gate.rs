use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use harvest_core::{EpochMs, HarvestItem, HarvestState, HOUR_MS};
use tracing::info;

use crate::clock::{Clock, SystemClock};

/// Alerts allowed through per window before silencing starts.
pub const MAX_ALERT_COUNT: usize = 5;
pub const LOOKBACK_WINDOW_MS: EpochMs = 24 * HOUR_MS;

/// One alert-worthy event. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertRecord {
    pub timestamp: EpochMs,
    pub item_key: Option<String>,
    pub item_state: Option<HarvestState>,
    pub owner_key: Option<String>,
}

impl AlertRecord {
    /// An occurrence with no item context.
    pub fn new(timestamp: EpochMs) -> Self {
        Self { timestamp, item_key: None, item_state: None, owner_key: None }
    }

    pub fn for_item(timestamp: EpochMs, item: &HarvestItem) -> Self {
        Self {
            timestamp,
            item_key: item.identity_key().map(str::to_string),
            item_state: item.harvest_state,
            owner_key: item.owner_key().map(str::to_string),
        }
    }

    fn is_fresh(&self) -> bool {
        self.item_key.is_some() && self.item_state.is_some_and(|s| s.is_fresh())
    }
}

/// Rolling-window alert limiter.
///
/// Invariant: the window is sorted ascending by timestamp. Records are only
/// ever appended, and an occurrence stamped earlier than the newest record is
/// clamped up to it, so pruning from the front is enough to drop everything
/// older than the window.
///
/// The window and the decision share one mutex, so callers on different
/// threads never see a count between a prune and the decision it feeds.
pub struct AlertGate {
    clock: Arc<dyn Clock>,
    window: Mutex<VecDeque<AlertRecord>>,
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertGate {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, window: Mutex::new(VecDeque::new()) }
    }

    pub fn now(&self) -> EpochMs {
        self.clock.now_ms()
    }

    /// Builds an occurrence stamped with the gate's clock.
    pub fn occurrence(&self, item: Option<&HarvestItem>) -> AlertRecord {
        match item {
            Some(item) => AlertRecord::for_item(self.now(), item),
            None => AlertRecord::new(self.now()),
        }
    }

    /// Records `occurrence` and returns true if its notification should be
    /// silenced.
    ///
    /// The occurrence is kept in the window even when silenced so the counts
    /// reflect how many alerts actually happened, not how many were delivered.
    pub fn record_and_should_silence(&self, mut occurrence: AlertRecord) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(newest) = window.back() {
            occurrence.timestamp = occurrence.timestamp.max(newest.timestamp);
        }
        window.push_back(occurrence.clone());

        prune(&mut window, self.clock.now_ms());
        debug_assert!(is_sorted(&window), "alert window out of order");

        let silenced = should_silence(&window, &occurrence);
        if silenced {
            info!(
                target: "harvest::alerts",
                item = occurrence.item_key.as_deref().unwrap_or("-"),
                owner = occurrence.owner_key.as_deref().unwrap_or("-"),
                retained = window.len(),
                "alert silenced (too many alerts)"
            );
        }
        silenced
    }

    /// Number of occurrences currently inside the window.
    pub fn retained(&self) -> usize {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut window, self.clock.now_ms());
        window.len()
    }

    /// Forgets all recorded occurrences.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&self) {
        self.window.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

fn prune(window: &mut VecDeque<AlertRecord>, now: EpochMs) {
    let start = now - LOOKBACK_WINDOW_MS;
    while window.front().is_some_and(|r| r.timestamp < start) {
        window.pop_front();
    }
}

fn is_sorted(window: &VecDeque<AlertRecord>) -> bool {
    window.iter().zip(window.iter().skip(1)).all(|(a, b)| a.timestamp <= b.timestamp)
}

/// Two tiers:
///
/// * Fresh items (`New`/`Updated` with a known item key) get through even when
///   the general quota is used up, but only once per item, and at most
///   [`MAX_ALERT_COUNT`] per owner. Ownerless occurrences share one owner bucket.
/// * Everything else is a plain sliding-window limit on the total count.
fn should_silence(window: &VecDeque<AlertRecord>, occurrence: &AlertRecord) -> bool {
    if !occurrence.is_fresh() {
        return window.len() > MAX_ALERT_COUNT;
    }

    let for_item = window.iter().filter(|r| r.item_key == occurrence.item_key).count();
    if for_item > 1 {
        return true;
    }

    let for_owner = window.iter().filter(|r| r.owner_key == occurrence.owner_key).count();
    for_owner > MAX_ALERT_COUNT
}

//! Per-player protection state.
//!
//! A [`ProtectionState`] exists only while its player is protected. It
//! records which deliveries are still outstanding, whether the client has
//! moved, what the protection flags looked like before the episode, and
//! what the manager itself last wrote to them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use packshield_tick::TaskHandle;
use packshield_types::DeliveryId;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// An engine flag the manager overrides during an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionFlag {
    Invulnerable,
    Collidable,
}

impl ProtectionFlag {
    pub const ALL: [Self; 2] = [Self::Invulnerable, Self::Collidable];
}

/// Who last changed a protection flag.
///
/// Deciding this from values alone is ambiguous: a third party that writes
/// the same value the manager wrote is indistinguishable from no write at
/// all. `ChangedExternally` can therefore also be latched explicitly when
/// the host reports a foreign write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOrigin {
    /// The manager never wrote this flag.
    Untouched,
    /// The flag still holds the value the manager wrote.
    ChangedByCore,
    /// Something else wrote the flag after the manager did.
    ChangedExternally,
}

/// Pre-episode value and last written value of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedFlag {
    original: bool,
    applied: Option<bool>,
    external: bool,
}

impl TrackedFlag {
    /// Starts tracking a flag whose value before protection is `original`.
    pub fn snapshot(original: bool) -> Self {
        Self {
            original,
            applied: None,
            external: false,
        }
    }

    pub fn original(&self) -> bool {
        self.original
    }

    pub fn applied(&self) -> Option<bool> {
        self.applied
    }

    /// Records a write by the manager. Clears any external latch, since the
    /// manager's value is now the latest one.
    pub fn record_applied(&mut self, value: bool) {
        self.applied = Some(value);
        self.external = false;
    }

    /// Latches a foreign write reported by the host. Ignored until the
    /// manager has written the flag.
    pub fn mark_external(&mut self) {
        if self.applied.is_some() {
            self.external = true;
        }
    }

    /// Classifies the flag given the value the engine reports now.
    pub fn classify(&self, current: bool) -> FlagOrigin {
        match self.applied {
            None => FlagOrigin::Untouched,
            Some(_) if self.external => FlagOrigin::ChangedExternally,
            Some(applied) if applied != current => FlagOrigin::ChangedExternally,
            Some(_) => FlagOrigin::ChangedByCore,
        }
    }
}

/// Outcome of restoring both flags at the end of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub invulnerable: FlagOrigin,
    pub collidable: FlagOrigin,
}

impl RestoreReport {
    /// Nothing was restored (player offline).
    pub const SKIPPED: Self = Self {
        invulnerable: FlagOrigin::Untouched,
        collidable: FlagOrigin::Untouched,
    };

    /// Returns `true` if any flag was left alone because of a foreign write.
    pub fn interference(&self) -> bool {
        self.invulnerable == FlagOrigin::ChangedExternally
            || self.collidable == FlagOrigin::ChangedExternally
    }
}

// ---------------------------------------------------------------------------
// ProtectionState
// ---------------------------------------------------------------------------

/// Read-only view of an active episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionStatus {
    pub pending_deliveries: Vec<DeliveryId>,
    pub movement_seen: bool,
    pub all_pending_resolved: bool,
}

/// Mutable state of one protection episode.
#[derive(Debug)]
pub(crate) struct ProtectionState {
    pending: HashSet<DeliveryId>,
    movement_seen: bool,
    all_pending_resolved: bool,
    pub(crate) invulnerable: TrackedFlag,
    pub(crate) collidable: TrackedFlag,
    snapshot_taken: bool,
    fallback: Option<TaskHandle>,
    /// Bumped every time the fallback timer is replaced. A firing timer
    /// carries the generation it was scheduled with; an older one is stale.
    fallback_generation: u64,
}

impl ProtectionState {
    pub(crate) fn new(original_invulnerable: bool, original_collidable: bool) -> Self {
        Self {
            pending: HashSet::new(),
            movement_seen: false,
            all_pending_resolved: true,
            invulnerable: TrackedFlag::snapshot(original_invulnerable),
            collidable: TrackedFlag::snapshot(original_collidable),
            snapshot_taken: true,
            fallback: None,
            fallback_generation: 0,
        }
    }

    /// A state whose pre-episode flags are not known yet. The first
    /// `begin_protection` to lock it records them.
    pub(crate) fn awaiting_snapshot() -> Self {
        Self {
            snapshot_taken: false,
            ..Self::new(false, true)
        }
    }

    pub(crate) fn has_snapshot(&self) -> bool {
        self.snapshot_taken
    }

    pub(crate) fn snapshot_flags(&mut self, invulnerable: bool, collidable: bool) {
        self.invulnerable = TrackedFlag::snapshot(invulnerable);
        self.collidable = TrackedFlag::snapshot(collidable);
        self.snapshot_taken = true;
    }

    /// Adds deliveries to the pending set. Returns how many were new.
    pub(crate) fn add_deliveries(&mut self, ids: impl IntoIterator<Item = DeliveryId>) -> usize {
        let before = self.pending.len();
        self.pending.extend(ids);
        self.all_pending_resolved = self.pending.is_empty();
        self.pending.len() - before
    }

    /// Marks a delivery as finished. Unknown ids are ignored.
    pub(crate) fn resolve(&mut self, id: DeliveryId) -> bool {
        let removed = self.pending.remove(&id);
        self.all_pending_resolved = self.pending.is_empty();
        removed
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Records movement. Returns `true` the first time.
    pub(crate) fn mark_moved(&mut self) -> bool {
        !std::mem::replace(&mut self.movement_seen, true)
    }

    /// Both release conditions hold.
    pub(crate) fn ready_for_release(&self) -> bool {
        self.all_pending_resolved && self.movement_seen
    }

    pub(crate) fn flag_mut(&mut self, flag: ProtectionFlag) -> &mut TrackedFlag {
        match flag {
            ProtectionFlag::Invulnerable => &mut self.invulnerable,
            ProtectionFlag::Collidable => &mut self.collidable,
        }
    }

    /// Reserves the generation for the next fallback timer.
    pub(crate) fn next_fallback_generation(&mut self) -> u64 {
        self.fallback_generation += 1;
        self.fallback_generation
    }

    /// Installs a new fallback timer, cancelling the previous one.
    pub(crate) fn install_fallback(&mut self, handle: TaskHandle) {
        if let Some(previous) = self.fallback.replace(handle) {
            previous.cancel();
        }
    }

    /// Removes the fallback timer without cancelling it.
    pub(crate) fn take_fallback(&mut self) -> Option<TaskHandle> {
        self.fallback.take()
    }

    pub(crate) fn is_current_fallback(&self, generation: u64) -> bool {
        self.fallback.is_some() && self.fallback_generation == generation
    }

    pub(crate) fn status(&self) -> ProtectionStatus {
        ProtectionStatus {
            pending_deliveries: self.pending.iter().copied().collect(),
            movement_seen: self.movement_seen,
            all_pending_resolved: self.all_pending_resolved,
        }
    }
}

/// Requests the engine made for this player while the episode was being
/// torn down on the same thread. Applied once the flags are restored.
#[derive(Debug, Default)]
pub(crate) struct Deferred {
    pub(crate) cleared: bool,
    pub(crate) deliveries: HashSet<DeliveryId>,
}

impl Deferred {
    /// Appends requests that arrived after `self` was taken.
    pub(crate) fn absorb(&mut self, later: Deferred) {
        if later.cleared {
            self.cleared = true;
            self.deliveries.clear();
        }
        self.deliveries.extend(later.deliveries);
    }
}

/// A registry slot: the episode's state plus its `active` flag.
///
/// `active` lives outside the mutex so [`is_protected`] never waits on an
/// episode that is busy on another thread. It only ever goes from `true`
/// to `false`; a new episode gets a new entry.
///
/// [`is_protected`]: crate::ProtectionManager::is_protected
#[derive(Debug)]
pub(crate) struct ProtectionEntry {
    active: AtomicBool,
    /// Thread that ended the episode; set right after `active` flips.
    ended_by: OnceLock<ThreadId>,
    deferred: Mutex<Deferred>,
    state: Mutex<ProtectionState>,
}

impl ProtectionEntry {
    pub(crate) fn new(state: ProtectionState) -> Self {
        Self {
            active: AtomicBool::new(true),
            ended_by: OnceLock::new(),
            deferred: Mutex::new(Deferred::default()),
            state: Mutex::new(state),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ends the episode. Returns `true` for the one caller that ended it.
    pub(crate) fn deactivate(&self) -> bool {
        let ended = self.active.swap(false, Ordering::AcqRel);
        if ended {
            let _ = self.ended_by.set(thread::current().id());
        }
        ended
    }

    /// Returns `true` if this thread ended the episode and may still be
    /// holding the lock while it restores flags. Implies `!is_active()`.
    /// Locking again from here would never return.
    pub(crate) fn ended_on_current_thread(&self) -> bool {
        self.ended_by
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProtectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deferred(&self) -> MutexGuard<'_, Deferred> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A disconnect arrived mid-release. Drops any deferred deliveries
    /// requested before it.
    pub(crate) fn defer_clear(&self) {
        let mut deferred = self.lock_deferred();
        deferred.cleared = true;
        deferred.deliveries.clear();
    }

    /// A new protection request arrived mid-release.
    pub(crate) fn defer_begin(&self, deliveries: impl IntoIterator<Item = DeliveryId>) {
        self.lock_deferred().deliveries.extend(deliveries);
    }

    pub(crate) fn take_deferred(&self) -> Deferred {
        std::mem::take(&mut *self.lock_deferred())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_untouched_until_applied() {
        let flag = TrackedFlag::snapshot(false);
        assert_eq!(flag.classify(true), FlagOrigin::Untouched);
        assert_eq!(flag.classify(false), FlagOrigin::Untouched);
    }

    #[test]
    fn test_classify_detects_value_change_after_apply() {
        let mut flag = TrackedFlag::snapshot(false);
        flag.record_applied(true);
        assert_eq!(flag.classify(true), FlagOrigin::ChangedByCore);
        assert_eq!(flag.classify(false), FlagOrigin::ChangedExternally);
    }

    #[test]
    fn test_mark_external_latches_even_when_value_matches() {
        let mut flag = TrackedFlag::snapshot(false);
        flag.mark_external();
        assert_eq!(flag.classify(true), FlagOrigin::Untouched, "ignored before apply");

        flag.record_applied(true);
        flag.mark_external();
        assert_eq!(flag.classify(true), FlagOrigin::ChangedExternally);

        flag.record_applied(true);
        assert_eq!(flag.classify(true), FlagOrigin::ChangedByCore, "reapply clears latch");
    }

    #[test]
    fn test_pending_set_recomputes_resolution() {
        let mut state = ProtectionState::new(false, true);
        let (a, b) = (DeliveryId::random(), DeliveryId::random());

        assert_eq!(state.add_deliveries([a, b, a]), 2);
        assert!(!state.status().all_pending_resolved);

        assert!(!state.resolve(DeliveryId::random()), "unknown id is ignored");
        assert!(state.resolve(a));
        assert!(!state.status().all_pending_resolved);
        assert!(state.resolve(b));
        assert!(state.status().all_pending_resolved);
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_release_needs_both_conditions() {
        let mut state = ProtectionState::new(false, true);
        let a = DeliveryId::random();
        state.add_deliveries([a]);

        assert!(state.mark_moved());
        assert!(!state.mark_moved(), "movement is only reported once");
        assert!(!state.ready_for_release());

        state.resolve(a);
        assert!(state.ready_for_release());
    }

    #[test]
    fn test_install_fallback_cancels_previous_and_bumps_generation() {
        let mut state = ProtectionState::new(false, true);
        let first = TaskHandle::new();
        let g1 = state.next_fallback_generation();
        state.install_fallback(first.clone());
        assert!(state.is_current_fallback(g1));

        let g2 = state.next_fallback_generation();
        state.install_fallback(TaskHandle::new());
        assert!(first.is_cancelled());
        assert!(!state.is_current_fallback(g1));
        assert!(state.is_current_fallback(g2));

        assert!(state.take_fallback().is_some());
        assert!(!state.is_current_fallback(g2));
    }

    #[test]
    fn test_entry_deactivates_once() {
        let entry = ProtectionEntry::new(ProtectionState::new(false, true));
        assert!(entry.is_active());
        assert!(entry.deactivate());
        assert!(!entry.deactivate());
        assert!(!entry.is_active());
        assert!(entry.ended_on_current_thread());
    }

    #[test]
    fn test_entry_remembers_ending_thread() {
        let entry = std::sync::Arc::new(ProtectionEntry::new(ProtectionState::new(false, true)));
        assert!(!entry.ended_on_current_thread());

        let other = std::sync::Arc::clone(&entry);
        std::thread::spawn(move || assert!(other.deactivate()))
            .join()
            .unwrap();

        assert!(!entry.is_active());
        assert!(!entry.ended_on_current_thread());
    }

    #[test]
    fn test_awaiting_snapshot_until_flags_recorded() {
        let mut state = ProtectionState::awaiting_snapshot();
        assert!(!state.has_snapshot());

        state.snapshot_flags(true, false);
        assert!(state.has_snapshot());
        assert!(state.invulnerable.original());
        assert!(!state.collidable.original());
        assert_eq!(state.invulnerable.applied(), None);
    }

    #[test]
    fn test_deferred_clear_drops_earlier_deliveries() {
        let entry = ProtectionEntry::new(ProtectionState::new(false, true));
        let (a, b) = (DeliveryId::random(), DeliveryId::random());

        entry.defer_begin([a]);
        entry.defer_clear();
        entry.defer_begin([b]);

        let deferred = entry.take_deferred();
        assert!(deferred.cleared);
        assert_eq!(deferred.deliveries, HashSet::from([b]));
        assert!(!entry.take_deferred().cleared);
    }

    #[test]
    fn test_deferred_absorb_keeps_request_order() {
        let (a, b) = (DeliveryId::random(), DeliveryId::random());
        let mut first = Deferred {
            cleared: false,
            deliveries: HashSet::from([a]),
        };
        first.absorb(Deferred {
            cleared: true,
            deliveries: HashSet::from([b]),
        });
        assert!(first.cleared);
        assert_eq!(first.deliveries, HashSet::from([b]));
    }

    #[test]
    fn test_restore_report_interference() {
        assert!(!RestoreReport::SKIPPED.interference());
        let report = RestoreReport {
            invulnerable: FlagOrigin::ChangedByCore,
            collidable: FlagOrigin::ChangedExternally,
        };
        assert!(report.interference());
    }
}

//! Reading position tracking with a local baseline and a debounced remote copy.
//!
//! Every page change is written to the local cache straight away. The remote
//! write waits for a quiet period; the host owns the actual timer and calls
//! [`ProgressTracker::fire`] with the generation it was given.

use pagemark_shared::{progress_percentage, ProgressPatch, ReadingProgress};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressState {
    Idle,
    PageDisplayed,
    PendingSave,
    Saved,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressAction {
    WriteLocal(ReadingProgress),
    /// Replaces any pending timer.
    ScheduleRemote { generation: u64, delay_ms: u32 },
    CancelTimer,
}

#[derive(Debug)]
pub struct ProgressTracker {
    page_count: u32,
    quiet_period_ms: u32,
    remote_enabled: bool,
    state: ProgressState,
    page: Option<u32>,
    generation: u64,
    scheduled: Option<ProgressPatch>,
    in_flight: Option<ProgressPatch>,
    persisted: Option<ProgressPatch>,
    failure_notified: bool,
}

impl ProgressTracker {
    pub fn new(page_count: u32, quiet_period_ms: u32) -> Self {
        Self {
            page_count,
            quiet_period_ms,
            remote_enabled: false,
            state: ProgressState::Idle,
            page: None,
            generation: 0,
            scheduled: None,
            in_flight: None,
            persisted: None,
            failure_notified: false,
        }
    }

    /// Remote writes only happen for signed-in readers whose reading set holds
    /// the document.
    pub fn enable_remote(&mut self, enabled: bool) {
        self.remote_enabled = enabled;
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    /// Records what the server already holds so it is never sent again.
    pub fn seed_persisted(&mut self, progress: &ReadingProgress) {
        self.persisted = Some(ProgressPatch {
            page: progress.page,
            percentage: progress.percentage,
        });
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn scheduled(&self) -> Option<ProgressPatch> {
        self.scheduled
    }

    pub fn persisted(&self) -> Option<ProgressPatch> {
        self.persisted
    }

    pub fn patch_for(&self, page: u32) -> ProgressPatch {
        ProgressPatch {
            page,
            percentage: progress_percentage(page, self.page_count),
        }
    }

    /// The first page shown after opening. Nothing is written.
    pub fn display(&mut self, page: u32) {
        self.page = Some(page);
        if self.state == ProgressState::Idle {
            self.state = ProgressState::PageDisplayed;
        }
    }

    pub fn page_changed(&mut self, page: u32, now_ms: u64) -> Vec<ProgressAction> {
        if self.page == Some(page) {
            return Vec::new();
        }
        self.page = Some(page);
        let patch = self.patch_for(page);
        let mut actions = vec![ProgressAction::WriteLocal(ReadingProgress {
            page: patch.page,
            percentage: patch.percentage,
            updated_at: now_ms,
        })];
        if !self.remote_enabled {
            self.state = ProgressState::Saved;
            return actions;
        }
        if self.scheduled == Some(patch) {
            return actions;
        }
        if self.persisted == Some(patch) || self.in_flight == Some(patch) {
            if self.scheduled.take().is_some() {
                self.generation += 1;
                actions.push(ProgressAction::CancelTimer);
            }
            if self.in_flight.is_none() {
                self.state = ProgressState::Saved;
            }
            return actions;
        }
        self.generation += 1;
        self.scheduled = Some(patch);
        self.state = ProgressState::PendingSave;
        actions.push(ProgressAction::ScheduleRemote {
            generation: self.generation,
            delay_ms: self.quiet_period_ms,
        });
        actions
    }

    /// The quiet period for `generation` elapsed. Returns the value to send, if
    /// that timer is still the live one.
    pub fn fire(&mut self, generation: u64) -> Option<ProgressPatch> {
        if generation != self.generation {
            return None;
        }
        let patch = self.scheduled.take()?;
        self.in_flight = Some(patch);
        Some(patch)
    }

    pub fn remote_succeeded(&mut self, patch: ProgressPatch) {
        self.persisted = Some(patch);
        if self.in_flight == Some(patch) {
            self.in_flight = None;
        }
        if self.scheduled.is_none() {
            self.state = ProgressState::Saved;
        }
    }

    /// Returns a notification the first time a remote write fails in this
    /// session. Failed writes are not retried; the next page change carries the
    /// freshest value.
    pub fn remote_failed(&mut self, patch: ProgressPatch) -> Option<&'static str> {
        if self.in_flight == Some(patch) {
            self.in_flight = None;
        }
        if self.scheduled.is_none() {
            self.state = ProgressState::PageDisplayed;
        }
        if self.failure_notified {
            return None;
        }
        self.failure_notified = true;
        Some("Reading progress could not be synced. It is still saved on this device.")
    }

    /// Invalidates any pending timer. Returns whether one was pending.
    pub fn teardown(&mut self) -> bool {
        self.generation += 1;
        self.scheduled.take().is_some()
    }
}

/// Initial page on open: remote record, then local cache, then page 1.
pub fn resolve_initial_page(
    remote: Option<&ReadingProgress>,
    local: Option<&ReadingProgress>,
    page_count: u32,
) -> u32 {
    let page = remote
        .or(local)
        .map(|progress| progress.page)
        .unwrap_or(1);
    page.max(1).min(page_count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(page_count: u32) -> ProgressTracker {
        let mut tracker = ProgressTracker::new(page_count, 5_000);
        tracker.enable_remote(true);
        tracker.display(1);
        tracker
    }

    fn schedules(actions: &[ProgressAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|action| match action {
                ProgressAction::ScheduleRemote { generation, .. } => Some(*generation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn last_page_records_full_percentage() {
        let mut tracker = tracker(10);
        let actions = tracker.page_changed(10, 42);
        assert_eq!(
            actions[0],
            ProgressAction::WriteLocal(ReadingProgress {
                page: 10,
                percentage: 100.0,
                updated_at: 42
            })
        );
    }

    #[test]
    fn rapid_page_changes_send_only_the_last() {
        let mut tracker = tracker(10);
        tracker.display(3);
        let mut generations = Vec::new();
        for page in [4, 5] {
            let actions = tracker.page_changed(page, 0);
            assert!(matches!(actions[0], ProgressAction::WriteLocal(_)));
            generations.extend(schedules(&actions));
        }
        assert_eq!(tracker.state(), ProgressState::PendingSave);
        let live = *generations.last().unwrap();
        for stale in &generations[..generations.len() - 1] {
            assert_eq!(tracker.fire(*stale), None);
        }
        let sent = tracker.fire(live).expect("live timer sends");
        assert_eq!(sent.page, 5);
        assert_eq!(tracker.fire(live), None);
    }

    #[test]
    fn repeating_the_scheduled_value_does_not_reschedule() {
        let mut tracker = tracker(10);
        assert_eq!(schedules(&tracker.page_changed(4, 0)).len(), 1);
        assert!(tracker.page_changed(4, 0).is_empty());
        tracker.display(6);
        let again = tracker.page_changed(4, 0);
        assert!(schedules(&again).is_empty());
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn returning_to_the_persisted_value_cancels_the_pending_write() {
        let mut tracker = tracker(10);
        let generation = schedules(&tracker.page_changed(3, 0))[0];
        let patch = tracker.fire(generation).unwrap();
        tracker.remote_succeeded(patch);
        assert_eq!(tracker.state(), ProgressState::Saved);

        schedules(&tracker.page_changed(4, 0));
        let back = tracker.page_changed(3, 0);
        assert!(back.contains(&ProgressAction::CancelTimer));
        assert!(schedules(&back).is_empty());
        assert_eq!(tracker.scheduled(), None);
        assert_eq!(tracker.state(), ProgressState::Saved);
    }

    #[test]
    fn local_only_when_remote_is_disabled() {
        let mut tracker = ProgressTracker::new(10, 5_000);
        tracker.display(1);
        let actions = tracker.page_changed(2, 0);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ProgressAction::WriteLocal(_)));
        assert_eq!(tracker.state(), ProgressState::Saved);
    }

    #[test]
    fn failure_notifies_once_per_session() {
        let mut tracker = tracker(10);
        let first = schedules(&tracker.page_changed(2, 0))[0];
        let patch = tracker.fire(first).unwrap();
        assert!(tracker.remote_failed(patch).is_some());
        let second = schedules(&tracker.page_changed(3, 0))[0];
        let patch = tracker.fire(second).unwrap();
        assert!(tracker.remote_failed(patch).is_none());
        assert_eq!(tracker.persisted(), None);
    }

    #[test]
    fn teardown_invalidates_pending_timer() {
        let mut tracker = tracker(10);
        let generation = schedules(&tracker.page_changed(2, 0))[0];
        assert!(tracker.teardown());
        assert_eq!(tracker.fire(generation), None);
    }

    #[test]
    fn initial_page_prefers_remote_then_local() {
        let remote = ReadingProgress {
            page: 7,
            percentage: 70.0,
            updated_at: 1,
        };
        let local = ReadingProgress {
            page: 4,
            percentage: 40.0,
            updated_at: 2,
        };
        assert_eq!(resolve_initial_page(Some(&remote), Some(&local), 10), 7);
        assert_eq!(resolve_initial_page(None, Some(&local), 10), 4);
        assert_eq!(resolve_initial_page(None, None, 10), 1);
        assert_eq!(resolve_initial_page(Some(&remote), None, 5), 5);
    }
}

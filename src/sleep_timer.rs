use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Snapshot of the single timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepTimerState {
    pub deadline: Option<Duration>,
    pub handle: Option<TimerHandle>,
}

struct Pending<F> {
    handle: TimerHandle,
    deadline: Duration,
    on_fire: F,
}

/// One-shot deferred callback with a single slot: setting a new timer drops the old one.
///
/// Times are readings of a [`crate::clock::Clock`]; nothing fires until [`SleepTimer::poll`]
/// is called with a time at or past the deadline.
pub struct SleepTimer<F> {
    slot: Option<Pending<F>>,
    next_handle: u64,
}

impl<F> Default for SleepTimer<F> {
    fn default() -> Self {
        Self {
            slot: None,
            next_handle: 0,
        }
    }
}

impl<F> SleepTimer<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any pending timer, then schedules `on_fire` after `minutes` when positive.
    ///
    /// Fractional minutes are honoured. A delay too long to represent saturates at
    /// [`Duration::MAX`], so such a timer never fires.
    pub fn set(&mut self, minutes: f64, now: Duration, on_fire: F) -> bool {
        self.cancel();
        if !minutes.is_finite() || minutes <= 0.0 {
            return false;
        }

        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        let delay = Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(Duration::MAX);
        let deadline = now.checked_add(delay).unwrap_or(Duration::MAX);
        self.slot = Some(Pending {
            handle,
            deadline,
            on_fire,
        });
        log::info!("sleep timer set for {minutes} min");
        true
    }

    pub fn cancel(&mut self) -> bool {
        let had_timer = self.slot.take().is_some();
        if had_timer {
            log::debug!("sleep timer cancelled");
        }
        had_timer
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn state(&self) -> SleepTimerState {
        SleepTimerState {
            deadline: self.slot.as_ref().map(|pending| pending.deadline),
            handle: self.slot.as_ref().map(|pending| pending.handle),
        }
    }

    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        self.slot
            .as_ref()
            .map(|pending| pending.deadline.saturating_sub(now))
    }

    /// Takes the callback out of the slot once its deadline has passed.
    pub fn poll(&mut self, now: Duration) -> Option<F> {
        if self.slot.as_ref()?.deadline > now {
            return None;
        }
        self.slot.take().map(|pending| pending.on_fire)
    }
}

/// `m:ss` rendering of a remaining duration.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

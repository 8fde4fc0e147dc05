use chrono::{DateTime, TimeDelta, Utc};
use log::trace;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFire {
    Tick,
    Deadline,
}

/// The countdown's two timers as one owned resource: a repeating display
/// tick and a one-shot at the round deadline (both in local time).
///
/// [`CountdownTimers::reschedule`] is the only way to arm them and always
/// cancels first, so repeated rollovers or remounts never stack timers.
#[derive(Debug)]
pub struct CountdownTimers {
    tick_every: TimeDelta,
    next_tick: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
}

impl CountdownTimers {
    pub fn new(tick_every: Duration) -> Self {
        let tick_every = TimeDelta::from_std(tick_every)
            .ok()
            .filter(|tick| *tick > TimeDelta::zero())
            .unwrap_or(TimeDelta::seconds(1));
        Self {
            tick_every,
            next_tick: None,
            deadline: None,
        }
    }

    pub fn reschedule(&mut self, deadline: DateTime<Utc>, now: DateTime<Utc>) {
        self.cancel();
        self.next_tick = Some(now + self.tick_every);
        self.deadline = Some(deadline);
        trace!(target: "timers", "Armed tick at {:?}, deadline at {}", self.next_tick, deadline);
    }

    pub fn cancel(&mut self) {
        self.next_tick = None;
        self.deadline = None;
    }

    /// When the host should next call [`CountdownTimers::poll`].
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        match (self.next_tick, self.deadline) {
            (Some(tick), Some(deadline)) => Some(tick.min(deadline)),
            (tick, deadline) => tick.or(deadline),
        }
    }

    /// Fires whatever is due at `now`. The tick fires at most once per poll
    /// no matter how late the poll is; the deadline fires once and disarms.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<TimerFire> {
        let mut fired = Vec::new();
        if let Some(tick) = self.next_tick {
            if tick <= now {
                fired.push(TimerFire::Tick);
                let mut next = tick + self.tick_every;
                while next <= now {
                    next += self.tick_every;
                }
                self.next_tick = Some(next);
            }
        }
        if let Some(deadline) = self.deadline {
            if deadline <= now {
                fired.push(TimerFire::Deadline);
                self.deadline = None;
            }
        }
        fired
    }
}

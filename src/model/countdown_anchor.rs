use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Local-to-server clock offset captured with a daily fetch, plus the
/// authoritative end of the current daily round.
#[readonly::make]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownAnchor {
    /// `server_now - local_now` at capture time.
    pub offset: TimeDelta,
    pub end_at: DateTime<Utc>,
}

impl CountdownAnchor {
    pub fn capture(
        server_now: DateTime<Utc>,
        local_now: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            offset: server_now - local_now,
            end_at,
        }
    }

    pub fn reanchor(&mut self, server_now: DateTime<Utc>, local_now: DateTime<Utc>) {
        self.offset = server_now - local_now;
    }

    pub fn server_now(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        local_now + self.offset
    }

    /// Local instant at which the server clock reaches `end_at`.
    pub fn local_deadline(&self) -> DateTime<Utc> {
        self.end_at - self.offset
    }

    pub fn remaining(&self, local_now: DateTime<Utc>) -> Duration {
        (self.end_at - self.server_now(local_now))
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, local_now: DateTime<Utc>) -> bool {
        self.server_now(local_now) >= self.end_at
    }
}

pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

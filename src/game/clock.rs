use chrono::{DateTime, NaiveDate, Utc};
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use std::thread;
use std::time::Duration;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for daily stats, progress and the daily rotation.
    /// UTC, the same basis as the daily deadline.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// Wall clock. Sleeps park a helper thread so they work under any local
/// executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        if duration.is_zero() {
            return futures::future::ready(()).boxed_local();
        }
        let (tx, rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            thread::sleep(duration);
            let _ = tx.send(());
        });
        rx.map(|_| ()).boxed_local()
    }
}

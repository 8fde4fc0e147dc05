//! Deterministic stand-ins for the outside world: a hand-driven clock, a
//! scripted pool source, recording telemetry and a single-threaded harness
//! that wires them into [`Services`].

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{self, ArcWake, LocalSpawnExt};
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::events::{Channel, EventEmitter, EventObserver};
use crate::game::clock::Clock;
use crate::game::repositories::SeenPoolRepository;
use crate::game::services::Services;
use crate::game::settings::Settings;
use crate::model::{
    BucketId, DailyPuzzle, GroupCategory, HangulDisplay, PhotoDisplay, Round, RoundDisplay,
    SessionEvent, SessionSnapshot,
};
use crate::source::{BatchRequest, FeedbackCategory, PoolSource, SourceError, Telemetry};
use crate::storage::{self, KeyValueStore, MemoryStore, StorageKey};

pub const EPOCH_SECS: i64 = 1_700_000_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH_SECS + secs, 0)
        .single()
        .unwrap_or_default()
}

pub fn photo_round(id: &str, answer: &str, category: GroupCategory) -> Round {
    let group_name = match category {
        GroupCategory::GirlGroup => "BLACKPINK",
        GroupCategory::BoyGroup => "BTS",
    };
    Round {
        bucket_id: id.to_string(),
        answer: answer.to_string(),
        alt_answer: None,
        category: Some(category),
        display: RoundDisplay::Photo(PhotoDisplay {
            group_name: group_name.to_string(),
            image_tiers: ["px32", "px16", "px8", "px4", "px2", "clear"]
                .iter()
                .map(|tier| format!("{id}/{tier}.jpg"))
                .collect(),
        }),
    }
}

pub fn hangul_round(id: &str, answer: &str, hangul: &str) -> Round {
    Round {
        bucket_id: id.to_string(),
        answer: answer.to_string(),
        alt_answer: None,
        category: None,
        display: RoundDisplay::Hangul(HangulDisplay {
            hangul: hangul.to_string(),
            group_name: None,
            image: None,
        }),
    }
}

pub fn daily_puzzle(round: Round, server_now: DateTime<Utc>, end_at: DateTime<Utc>) -> DailyPuzzle {
    DailyPuzzle {
        round,
        end_at,
        server_now,
    }
}

/// A clock that only moves when told to. Sleeps resolve when time is
/// advanced past them or when fired explicitly.
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    today: Cell<Option<NaiveDate>>,
    sleepers: RefCell<Vec<(DateTime<Utc>, oneshot::Sender<()>)>>,
}

impl ManualClock {
    pub fn starting_at(secs: i64) -> Rc<Self> {
        Rc::new(Self {
            now: Cell::new(at(secs)),
            today: Cell::new(None),
            sleepers: RefCell::new(Vec::new()),
        })
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.today.set(Some(today));
    }

    pub fn pending_sleeps(&self) -> usize {
        self.sleepers.borrow().len()
    }

    /// Moves time forward and wakes every sleep that is now due.
    pub fn advance(&self, by: Duration) {
        let by = TimeDelta::from_std(by).unwrap_or_default();
        self.now.set(self.now.get() + by);
        let now = self.now.get();
        let due: Vec<_> = {
            let mut sleepers = self.sleepers.borrow_mut();
            let (due, waiting) = sleepers.drain(..).partition(|(wake_at, _)| *wake_at <= now);
            *sleepers = waiting;
            due
        };
        for (_, waker) in due {
            let _ = waker.send(());
        }
    }

    /// Wakes the earliest sleep, moving time up to it. `false` when nothing
    /// is sleeping.
    pub fn fire_next_sleep(&self) -> bool {
        let next = {
            let mut sleepers = self.sleepers.borrow_mut();
            let Some(index) = sleepers
                .iter()
                .enumerate()
                .min_by_key(|(_, (wake_at, _))| *wake_at)
                .map(|(index, _)| index)
            else {
                return false;
            };
            sleepers.remove(index)
        };
        let (wake_at, waker) = next;
        if wake_at > self.now.get() {
            self.now.set(wake_at);
        }
        let _ = waker.send(());
        true
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn today(&self) -> NaiveDate {
        self.today
            .get()
            .unwrap_or_else(|| self.now.get().date_naive())
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        if duration.is_zero() {
            return futures::future::ready(()).boxed_local();
        }
        let wake_at = self.now.get() + TimeDelta::from_std(duration).unwrap_or_default();
        let (tx, rx) = oneshot::channel();
        self.sleepers.borrow_mut().push((wake_at, tx));
        rx.map(|_| ()).boxed_local()
    }
}

type BatchResult = Result<Vec<Round>, SourceError>;
type DailyResult = Result<Option<DailyPuzzle>, SourceError>;

/// Pool source fed by the test. Batches are served in push order; an empty
/// queue answers with an empty batch. In held mode requests wait until the
/// test releases them.
#[derive(Default)]
pub struct ScriptedSource {
    batches: RefCell<VecDeque<BatchResult>>,
    hold_batches: Cell<bool>,
    waiting_batches: RefCell<VecDeque<oneshot::Sender<BatchResult>>>,
    requests: RefCell<Vec<BatchRequest>>,
    daily: RefCell<Option<DailyPuzzle>>,
    fail_daily: Cell<bool>,
    hold_daily: Cell<bool>,
    waiting_daily: RefCell<Vec<oneshot::Sender<DailyResult>>>,
    daily_calls: Cell<usize>,
}

impl ScriptedSource {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn push_batch(&self, batch: Vec<Round>) {
        self.batches.borrow_mut().push_back(Ok(batch));
    }

    pub fn fail_next_batch(&self) {
        self.batches
            .borrow_mut()
            .push_back(Err(SourceError::Unavailable("scripted".to_string())));
    }

    pub fn hold_batches(&self) {
        self.hold_batches.set(true);
    }

    /// Answers the oldest held batch request.
    pub fn release_batch(&self, batch: Vec<Round>) -> bool {
        match self.waiting_batches.borrow_mut().pop_front() {
            Some(waiter) => waiter.send(Ok(batch)).is_ok(),
            None => false,
        }
    }

    pub fn batch_requests(&self) -> Vec<BatchRequest> {
        self.requests.borrow().clone()
    }

    pub fn set_daily(&self, daily: Option<DailyPuzzle>) {
        *self.daily.borrow_mut() = daily;
    }

    pub fn fail_daily(&self, fail: bool) {
        self.fail_daily.set(fail);
    }

    pub fn hold_daily(&self) {
        self.hold_daily.set(true);
    }

    /// Answers every held daily request with the current daily.
    pub fn release_daily(&self) -> usize {
        self.hold_daily.set(false);
        let waiters: Vec<_> = self.waiting_daily.borrow_mut().drain(..).collect();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(self.daily_result());
        }
        count
    }

    /// Answers the oldest held daily request with `daily`; the rest stay
    /// held.
    pub fn release_oldest_daily(&self, daily: Option<DailyPuzzle>) -> bool {
        let waiter = {
            let mut waiting = self.waiting_daily.borrow_mut();
            (!waiting.is_empty()).then(|| waiting.remove(0))
        };
        waiter.is_some_and(|waiter| waiter.send(Ok(daily)).is_ok())
    }

    /// Answers the most recent held daily request with `daily`.
    pub fn release_newest_daily(&self, daily: Option<DailyPuzzle>) -> bool {
        let waiter = self.waiting_daily.borrow_mut().pop();
        waiter.is_some_and(|waiter| waiter.send(Ok(daily)).is_ok())
    }

    pub fn daily_calls(&self) -> usize {
        self.daily_calls.get()
    }

    fn daily_result(&self) -> DailyResult {
        if self.fail_daily.get() {
            return Err(SourceError::Unavailable("scripted".to_string()));
        }
        Ok(self.daily.borrow().clone())
    }
}

impl PoolSource for ScriptedSource {
    fn fetch_current_daily(&self) -> LocalBoxFuture<'static, DailyResult> {
        self.daily_calls.set(self.daily_calls.get() + 1);
        if self.hold_daily.get() {
            let (tx, rx) = oneshot::channel();
            self.waiting_daily.borrow_mut().push(tx);
            return rx
                .map(|answer| answer.unwrap_or_else(|_| Err(SourceError::Unavailable("dropped".to_string()))))
                .boxed_local();
        }
        futures::future::ready(self.daily_result()).boxed_local()
    }

    fn fetch_random_batch(&self, request: BatchRequest) -> LocalBoxFuture<'static, BatchResult> {
        self.requests.borrow_mut().push(request);
        if self.hold_batches.get() {
            let (tx, rx) = oneshot::channel();
            self.waiting_batches.borrow_mut().push_back(tx);
            return rx
                .map(|answer| answer.unwrap_or_else(|_| Err(SourceError::Unavailable("dropped".to_string()))))
                .boxed_local();
        }
        let next = self.batches.borrow_mut().pop_front().unwrap_or(Ok(Vec::new()));
        futures::future::ready(next).boxed_local()
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    guesses: RefCell<Vec<(String, String, bool, usize)>>,
    outcomes: RefCell<Vec<(String, usize, u32)>>,
    feedback: RefCell<Vec<(FeedbackCategory, String)>>,
    failing: Cell<bool>,
}

impl RecordingTelemetry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Every report is still recorded but answers with an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn guesses(&self) -> Vec<(String, String, bool, usize)> {
        self.guesses.borrow().clone()
    }

    pub fn outcomes(&self) -> Vec<(String, usize, u32)> {
        self.outcomes.borrow().clone()
    }

    pub fn feedback(&self) -> Vec<(FeedbackCategory, String)> {
        self.feedback.borrow().clone()
    }

    fn answer(&self) -> Result<(), SourceError> {
        if self.failing.get() {
            Err(SourceError::Unavailable("scripted".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Telemetry for RecordingTelemetry {
    fn report_guess(
        &self,
        round_id: &str,
        text: &str,
        correct: bool,
        guess_number: usize,
    ) -> Result<(), SourceError> {
        self.guesses.borrow_mut().push((
            round_id.to_string(),
            text.to_string(),
            correct,
            guess_number,
        ));
        self.answer()
    }

    fn report_round_outcome(
        &self,
        round_id: &str,
        guess_count: usize,
        streak: u32,
    ) -> Result<(), SourceError> {
        self.outcomes
            .borrow_mut()
            .push((round_id.to_string(), guess_count, streak));
        self.answer()
    }

    fn report_feedback(&self, category: FeedbackCategory, message: &str) -> Result<(), SourceError> {
        self.feedback
            .borrow_mut()
            .push((category, message.to_string()));
        self.answer()
    }
}

#[derive(Default)]
struct WakeFlag(AtomicBool);

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::SeqCst);
    }
}

/// Result slot for a future spawned on the harness pool.
pub struct Spawned<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Spawned<T> {
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }

    pub fn is_done(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

pub struct Harness {
    pool: RefCell<LocalPool>,
    pub clock: Rc<ManualClock>,
    pub source: Rc<ScriptedSource>,
    pub telemetry: Rc<RecordingTelemetry>,
    pub store: Rc<dyn KeyValueStore>,
    pub settings: Settings,
    pub emitter: EventEmitter<SessionEvent>,
    pub observer: EventObserver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let (emitter, observer) = Channel::new();
        Self {
            pool: RefCell::new(LocalPool::new()),
            clock: ManualClock::starting_at(0),
            source: ScriptedSource::new(),
            telemetry: RecordingTelemetry::new(),
            store: Rc::new(MemoryStore::new()),
            settings,
            emitter,
            observer,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            source: self.source.clone(),
            telemetry: self.telemetry.clone(),
            store: Rc::clone(&self.store),
            clock: self.clock.clone(),
            spawner: Rc::new(self.pool.borrow().spawner()),
        }
    }

    pub fn spawn<F>(&self, future: F) -> Spawned<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let result = Rc::clone(&slot);
        let spawner = self.pool.borrow().spawner();
        spawner
            .spawn_local(async move {
                let output = future.await;
                *result.borrow_mut() = Some(output);
            })
            .expect("spawn on test pool");
        Spawned { slot }
    }

    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Drives `future` to completion alongside the spawned tasks, firing
    /// sleeps in deadline order whenever everything is stuck.
    pub fn settle<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let woken = Arc::new(WakeFlag::default());
        let waker = task::waker(Arc::clone(&woken));
        let mut cx = Context::from_waker(&waker);
        loop {
            woken.0.store(false, Ordering::SeqCst);
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                self.run_until_stalled();
                return output;
            }
            self.run_until_stalled();
            if woken.0.load(Ordering::SeqCst) {
                continue;
            }
            assert!(
                self.clock.fire_next_sleep(),
                "future stalled with nothing left to wake"
            );
        }
    }

    pub fn fire_all_sleeps(&self) {
        self.run_until_stalled();
        while self.clock.fire_next_sleep() {
            self.run_until_stalled();
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
        self.run_until_stalled();
    }

    pub fn snapshot(&self, key: StorageKey) -> Option<SessionSnapshot> {
        storage::load_json(&*self.store, key)
    }

    pub fn put_snapshot(&self, key: StorageKey, snapshot: &SessionSnapshot) {
        assert!(storage::save_json(&*self.store, key, snapshot));
    }

    pub fn put_raw(&self, key: StorageKey, raw: &str) {
        self.store
            .set(key.as_str(), raw)
            .expect("memory store accepts writes");
    }

    pub fn seen(&self, key: StorageKey) -> HashSet<BucketId> {
        SeenPoolRepository::new(Rc::clone(&self.store), key).load()
    }

    /// Collects every event emitted from now on.
    pub fn record_events(&self) -> Rc<RefCell<Vec<SessionEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        self.observer
            .subscribe(move |event: &SessionEvent| sink.borrow_mut().push(event.clone()));
        events
    }
}

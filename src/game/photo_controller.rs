use chrono::{DateTime, Utc};
use futures::task::LocalSpawnExt;
use log::{debug, info, trace, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::countdown_timers::{CountdownTimers, TimerFire};
use super::generation::Generation;
use super::infinite_session::InfiniteSession;
use super::repositories::Preferences;
use super::round_state::{GuessOutcome, RoundState};
use super::services::Services;
use super::settings::Settings;
use super::single_flight::SingleFlight;
use super::stats_tracker::{RoundOutcome, StatsTracker};
use super::variant_policy::{PhotoPolicy, VariantPolicy};
use crate::destroyable::Destroyable;
use crate::events::{Channel, EventEmitter, EventObserver};
use crate::model::{
    CountdownAnchor, DailyPuzzle, GameMode, GroupFilter, GuessRow, GuessSlot, KeyInput,
    RoundResult, SessionEvent, SessionPhase, SlotOutcome, StatsMode, StatsRecord,
};
use crate::source::FeedbackCategory;

const MAX_LOAD_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DailyFlight {
    Load,
}

struct DailyState {
    round: RoundState,
    anchor: Option<CountdownAnchor>,
    timers: CountdownTimers,
    /// Deadline the last rollover ran for; a deadline only rolls once.
    last_rolled_deadline: Option<DateTime<Utc>>,
}

struct Inner {
    services: Services,
    settings: Settings,
    mode: Cell<GameMode>,
    daily: RefCell<DailyState>,
    stats: RefCell<StatsTracker>,
    prefs: Preferences,
    infinite: InfiniteSession<PhotoPolicy>,
    flights: SingleFlight<DailyFlight, ()>,
    generation: Generation,
    destroyed: Cell<bool>,
    emitter: EventEmitter<SessionEvent>,
    observer: EventObserver<SessionEvent>,
}

/// The photo game: one shared daily round with a countdown to the next, and
/// an endless mode behind the same screen.
#[derive(Clone)]
pub struct PhotoController {
    inner: Rc<Inner>,
}

impl PhotoController {
    pub fn new(services: Services, settings: Settings) -> Self {
        let (emitter, observer) = Channel::new();
        let prefs = Preferences::new(Rc::clone(&services.store));
        let daily = DailyState {
            round: RoundState::new(PhotoPolicy::SLOT_COUNT),
            anchor: None,
            timers: CountdownTimers::new(settings.tick_interval()),
            last_rolled_deadline: None,
        };
        Self {
            inner: Rc::new(Inner {
                infinite: InfiniteSession::new(services.clone(), settings.clone(), emitter.clone()),
                stats: RefCell::new(StatsTracker::new(
                    Rc::clone(&services.store),
                    Rc::clone(&services.clock),
                    StatsMode::Daily,
                )),
                mode: Cell::new(prefs.selected_mode()),
                daily: RefCell::new(daily),
                prefs,
                services,
                settings,
                flights: SingleFlight::new(),
                generation: Generation::new(),
                destroyed: Cell::new(false),
                emitter,
                observer,
            }),
        }
    }

    pub fn observer(&self) -> EventObserver<SessionEvent> {
        self.inner.observer.clone()
    }

    pub fn mode(&self) -> GameMode {
        self.inner.mode.get()
    }

    pub fn infinite(&self) -> &InfiniteSession<PhotoPolicy> {
        &self.inner.infinite
    }

    pub fn daily_phase(&self) -> SessionPhase {
        self.inner.daily.borrow().round.phase
    }

    pub fn daily_bucket_id(&self) -> Option<String> {
        self.inner
            .daily
            .borrow()
            .round
            .bucket_id()
            .map(str::to_string)
    }

    pub fn daily_slots(&self) -> Vec<GuessSlot> {
        self.inner.daily.borrow().round.slots.slots().to_vec()
    }

    pub fn daily_stats(&self) -> StatsRecord {
        self.inner.stats.borrow().record().clone()
    }

    /// Today's guesses in the order they were made.
    pub fn daily_attempts(&self) -> Vec<String> {
        let today = self.inner.services.clock.today();
        self.inner.stats.borrow().list_guess_attempts(today)
    }

    pub fn countdown_remaining(&self) -> Option<Duration> {
        let now = self.inner.services.clock.now();
        self.inner
            .daily
            .borrow()
            .anchor
            .map(|anchor| anchor.remaining(now))
    }

    /// When the host should next call [`PhotoController::pump_timers`].
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.inner.daily.borrow().timers.next_wakeup()
    }

    pub fn is_first_visit(&self) -> bool {
        self.inner.prefs.is_first_visit()
    }

    pub fn mark_visited(&self) {
        self.inner.prefs.mark_visited();
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.inner.emitter.emit(event);
        }
    }

    fn daily_view_events(&self, daily: &DailyState) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Some(round) = &daily.round.round {
            events.push(SessionEvent::RoundStarted {
                bucket_id: round.bucket_id.clone(),
                display: round.display.clone(),
                slot_count: PhotoPolicy::SLOT_COUNT,
            });
            events.push(SessionEvent::SlotsChanged(daily.round.slots.slots().to_vec()));
        }
        events.push(SessionEvent::HintCleared);
        events.push(SessionEvent::InputChanged(daily.round.input.clone()));
        events.push(SessionEvent::ConfettiChanged(daily.round.confetti));
        events.push(SessionEvent::PhaseChanged(daily.round.phase));
        let stats = self.inner.stats.borrow().record().clone();
        events.push(SessionEvent::StreakChanged(stats.current_streak));
        events.push(SessionEvent::StatsChanged(stats));
        if let Some(anchor) = daily.anchor {
            events.push(SessionEvent::CountdownTick {
                remaining: anchor.remaining(self.inner.services.clock.now()),
            });
        }
        events
    }

    /// Mount: restores the last selected mode, loads today's round (the
    /// countdown runs in every mode) and brings the selected mode on screen.
    pub async fn start(&self) {
        let mode = self.inner.prefs.selected_mode();
        self.inner.mode.set(mode);
        info!(target: "session", "Photo controller starting in {:?} mode", mode);
        self.inner.emitter.emit(SessionEvent::ModeChanged(mode));
        self.load_daily().await;
        if mode == GameMode::Infinite {
            self.inner.infinite.activate().await;
        }
    }

    pub async fn set_mode(&self, mode: GameMode) {
        let previous = self.inner.mode.replace(mode);
        self.inner.prefs.set_selected_mode(mode);
        if previous == GameMode::Infinite && mode != GameMode::Infinite {
            self.inner.infinite.suspend();
        }
        if previous == GameMode::Daily && mode != GameMode::Daily {
            // an unfinished reveal must not land after the screen changed
            self.inner.daily.borrow_mut().round.reset_transient();
        }
        info!(target: "session", "Mode {:?} -> {:?}", previous, mode);
        self.inner.emitter.emit(SessionEvent::ModeChanged(mode));

        match mode {
            GameMode::Daily => {
                let has_round = {
                    let mut daily = self.inner.daily.borrow_mut();
                    daily.round.reset_transient();
                    daily.round.round.is_some()
                };
                if has_round {
                    let events = self.daily_view_events(&self.inner.daily.borrow());
                    self.emit_all(events);
                } else {
                    self.load_daily().await;
                }
            }
            GameMode::Infinite => self.inner.infinite.activate().await,
        }
    }

    /// Fetches and installs the current daily round. Concurrent callers share
    /// one fetch, which is retried when the generation moves while it is out;
    /// a failure leaves the daily screen loading.
    pub async fn load_daily(&self) {
        let this = self.clone();
        self.inner
            .flights
            .run(DailyFlight::Load, move || async move {
                this.load_daily_inner().await
            })
            .await
    }

    async fn load_daily_inner(&self) {
        for attempt in 0..MAX_LOAD_ATTEMPTS {
            let token = self.inner.generation.current();
            let fetched = self.inner.services.source.fetch_current_daily().await;
            if self.inner.destroyed.get() {
                debug!(target: "daily", "Dropping daily response after teardown");
                return;
            }
            if !self.inner.generation.is_current(token) {
                debug!(target: "daily", "Daily load attempt {} went stale; retrying", attempt + 1);
                continue;
            }
            match fetched {
                Ok(Some(puzzle)) => self.install_daily(puzzle),
                Ok(None) => {
                    warn!(target: "daily", "Pool source has no daily round");
                    self.show_daily_loading();
                }
                Err(err) => {
                    warn!(target: "daily", "Daily fetch failed: {}", err);
                    self.show_daily_loading();
                }
            }
            return;
        }
        warn!(target: "daily", "Daily load kept going stale; staying in loading");
        self.show_daily_loading();
    }

    fn show_daily_loading(&self) {
        self.inner.daily.borrow_mut().round.clear();
        if self.mode() == GameMode::Daily {
            self.inner
                .emitter
                .emit(SessionEvent::PhaseChanged(SessionPhase::Loading));
        }
    }

    /// Puts `puzzle` on screen: anchors the clock, restores today's finished
    /// result or saved progress for this round, and rearms the countdown.
    fn install_daily(&self, puzzle: DailyPuzzle) {
        let now = self.inner.services.clock.now();
        let today = self.inner.services.clock.today();
        let anchor = CountdownAnchor::capture(puzzle.server_now, now, puzzle.end_at);
        let round_id = puzzle.round.bucket_id.clone();

        let (slots, finished) = {
            let stats = self.inner.stats.borrow();
            match stats
                .today_completion(today)
                .filter(|completion| completion.round_id == round_id)
            {
                Some(completion) => (
                    Some(GuessRow::finished(
                        PhotoPolicy::SLOT_COUNT,
                        completion.won,
                        completion.guess_count,
                    )),
                    Some(RoundResult {
                        bucket_id: round_id.clone(),
                        won: completion.won,
                        answer: puzzle.round.answer.clone(),
                        guess_count: completion.guess_count,
                    }),
                ),
                None => (
                    stats
                        .load_in_progress(today)
                        .filter(|progress| progress.round_id == round_id)
                        .map(|progress| GuessRow::restore(&progress.slots, PhotoPolicy::SLOT_COUNT)),
                    None,
                ),
            }
        };

        let events = {
            let mut daily = self.inner.daily.borrow_mut();
            daily.round.start(puzzle.round, slots);
            daily.anchor = Some(anchor);
            let deadline = anchor.local_deadline();
            daily.timers.reschedule(deadline, now);
            info!(
                target: "daily",
                "Daily round {} installed ({:?}), ends in {}s (offset {}s)",
                round_id,
                daily.round.phase,
                anchor.remaining(now).as_secs(),
                anchor.offset.num_seconds()
            );
            if self.mode() == GameMode::Daily {
                let mut events = self.daily_view_events(&daily);
                events.extend(finished.map(SessionEvent::RoundFinished));
                events
            } else {
                vec![SessionEvent::CountdownTick {
                    remaining: anchor.remaining(now),
                }]
            }
        };
        self.emit_all(events);
    }

    /// Fires due countdown timers. Either the display tick reaching zero or
    /// the deadline timer triggers the rollover; returns whether one ran.
    pub async fn pump_timers(&self) -> bool {
        let now = self.inner.services.clock.now();
        let (fired, anchor) = {
            let mut daily = self.inner.daily.borrow_mut();
            let fired = daily.timers.poll(now);
            (fired, daily.anchor)
        };
        let mut expired = false;
        for fire in fired {
            match fire {
                TimerFire::Tick => {
                    if let Some(anchor) = anchor {
                        self.inner.emitter.emit(SessionEvent::CountdownTick {
                            remaining: anchor.remaining(now),
                        });
                        expired |= anchor.is_expired(now);
                    }
                }
                TimerFire::Deadline => expired = true,
            }
        }
        if expired {
            return self.rollover().await;
        }
        false
    }

    /// Moves to the next daily round once the current one's deadline passes.
    /// Runs at most once per deadline no matter how many timers report it.
    pub async fn rollover(&self) -> bool {
        {
            let mut daily = self.inner.daily.borrow_mut();
            let deadline = daily.anchor.map(|anchor| anchor.end_at);
            if deadline.is_some() && deadline == daily.last_rolled_deadline {
                trace!(target: "timers", "Rollover for {:?} already ran", deadline);
                return false;
            }
            daily.last_rolled_deadline = deadline;
            daily.timers.cancel();
            daily.round.clear();
        }
        self.inner.generation.bump();
        info!(target: "daily", "Daily deadline reached; rolling over");
        if self.mode() == GameMode::Daily {
            self.emit_all(vec![
                SessionEvent::ConfettiChanged(false),
                SessionEvent::InputChanged(String::new()),
                SessionEvent::PhaseChanged(SessionPhase::Loading),
            ]);
        }
        self.load_daily().await;
        true
    }

    /// Page became visible again. Re-reads the daily metadata: the same round
    /// re-anchors the clock, a different round replaces the current one.
    pub async fn on_visibility_regained(&self) {
        let token = self.inner.generation.current();
        let fetched = self.inner.services.source.fetch_current_daily().await;
        if !self.inner.generation.is_current(token) {
            debug!(target: "daily", "Dropping stale re-anchor response");
            return;
        }
        let puzzle = match fetched {
            Ok(Some(puzzle)) => puzzle,
            Ok(None) => return,
            Err(err) => {
                debug!(target: "daily", "Re-anchor fetch failed: {}", err);
                return;
            }
        };
        let already_rolled = self
            .inner
            .daily
            .borrow()
            .last_rolled_deadline
            .is_some_and(|rolled| puzzle.end_at <= rolled);
        if already_rolled {
            debug!(target: "daily", "Ignoring daily {} that already rolled over", puzzle.round.bucket_id);
            return;
        }
        let same_round = self.daily_bucket_id().as_deref() == Some(puzzle.round.bucket_id.as_str());
        if !same_round {
            info!(target: "daily", "Daily round changed while hidden");
            self.inner.generation.bump();
            self.inner.daily.borrow_mut().timers.cancel();
            self.install_daily(puzzle);
            return;
        }

        let now = self.inner.services.clock.now();
        let remaining = {
            let mut daily = self.inner.daily.borrow_mut();
            let anchor = match daily.anchor {
                Some(mut anchor) if anchor.end_at == puzzle.end_at => {
                    anchor.reanchor(puzzle.server_now, now);
                    anchor
                }
                _ => CountdownAnchor::capture(puzzle.server_now, now, puzzle.end_at),
            };
            daily.anchor = Some(anchor);
            daily.timers.reschedule(anchor.local_deadline(), now);
            debug!(target: "timers", "Re-anchored, offset now {}s", anchor.offset.num_seconds());
            anchor.remaining(now)
        };
        self.inner
            .emitter
            .emit(SessionEvent::CountdownTick { remaining });
    }

    pub fn handle_input_key(&self, key: KeyInput) -> bool {
        if self.mode() == GameMode::Infinite {
            return self.inner.infinite.handle_input_key(key);
        }
        let input = {
            let mut daily = self.inner.daily.borrow_mut();
            if !daily.round.apply_key(key) {
                return false;
            }
            daily.round.input.clone()
        };
        self.inner.emitter.emit(SessionEvent::InputChanged(input));
        true
    }

    pub async fn handle_key(&self, key: KeyInput) -> Option<GuessOutcome> {
        if key == KeyInput::Enter {
            return Some(self.submit_guess().await);
        }
        self.handle_input_key(key);
        None
    }

    pub fn set_input(&self, text: &str) {
        if self.mode() == GameMode::Infinite {
            self.inner.infinite.set_input(text);
            return;
        }
        let input = {
            let mut daily = self.inner.daily.borrow_mut();
            if !daily.round.phase.accepts_input() {
                return;
            }
            daily.round.input = text.to_string();
            daily.round.input.clone()
        };
        self.inner.emitter.emit(SessionEvent::InputChanged(input));
    }

    pub async fn submit_guess(&self) -> GuessOutcome {
        match self.mode() {
            GameMode::Daily => self.submit_daily_guess().await,
            GameMode::Infinite => self.inner.infinite.submit_guess().await,
        }
    }

    async fn submit_daily_guess(&self) -> GuessOutcome {
        let token = self.inner.generation.current();
        let pending = {
            let mut daily = self.inner.daily.borrow_mut();
            match daily.round.begin_guess(false) {
                Ok(pending) => pending,
                Err(reason) => return GuessOutcome::Rejected(reason),
            }
        };
        self.emit_all(vec![
            SessionEvent::InputChanged(String::new()),
            SessionEvent::PhaseChanged(SessionPhase::Animating),
        ]);
        let today = self.inner.services.clock.today();
        self.inner
            .stats
            .borrow()
            .record_guess_attempt(today, &pending.text);
        if let Err(err) = self.inner.services.telemetry.report_guess(
            &pending.bucket_id,
            &pending.text,
            pending.correct,
            pending.guess_number,
        ) {
            debug!(target: "daily", "Guess report failed: {}", err);
        }

        self.inner
            .services
            .clock
            .sleep(self.inner.settings.reveal_delay())
            .await;

        let (outcome, slots, remaining, answer) = {
            let mut daily = self.inner.daily.borrow_mut();
            let same_round = daily.round.bucket_id() == Some(pending.bucket_id.as_str());
            if !self.inner.generation.is_current(token)
                || !same_round
                || daily.round.phase != SessionPhase::Animating
            {
                debug!(target: "daily", "Dropping guess {:?}: daily moved on", pending.text);
                return GuessOutcome::Discarded;
            }
            let outcome = daily.round.commit_guess(&pending);
            let answer = daily
                .round
                .round
                .as_ref()
                .map(|round| round.answer.clone())
                .unwrap_or_default();
            (
                outcome,
                daily.round.slots.slots().to_vec(),
                daily.round.slots.remaining(),
                answer,
            )
        };
        let phase = self.daily_phase();
        self.emit_all(vec![
            SessionEvent::SlotsChanged(slots.clone()),
            SessionEvent::PhaseChanged(phase),
        ]);

        if outcome == SlotOutcome::InProgress {
            self.inner
                .stats
                .borrow()
                .save_in_progress(today, &pending.bucket_id, &slots);
            return GuessOutcome::Incorrect {
                guess_number: pending.guess_number,
                remaining,
            };
        }

        let won = outcome == SlotOutcome::Won;
        let streak = {
            let mut stats = self.inner.stats.borrow_mut();
            stats.clear_in_progress();
            let attempts = stats.list_guess_attempts(today);
            stats.record_outcome(
                today,
                RoundOutcome {
                    won,
                    guess_count: pending.guess_number,
                    round_id: Some(pending.bucket_id.clone()),
                    answer: Some(answer.clone()),
                    attempts,
                },
            );
            stats.record().current_streak
        };
        if let Err(err) = self.inner.services.telemetry.report_round_outcome(
            &pending.bucket_id,
            pending.guess_number,
            streak,
        ) {
            debug!(target: "daily", "Outcome report failed: {}", err);
        }
        self.schedule_result(RoundResult {
            bucket_id: pending.bucket_id.clone(),
            won,
            answer: answer.clone(),
            guess_count: pending.guess_number,
        });

        if won {
            GuessOutcome::Won {
                guess_number: pending.guess_number,
            }
        } else {
            GuessOutcome::Lost { answer }
        }
    }

    /// Surfaces the finished daily after the result delay, unless the screen
    /// moved on first.
    fn schedule_result(&self, result: RoundResult) {
        let token = self.inner.generation.current();
        let sleep = self
            .inner
            .services
            .clock
            .sleep(self.inner.settings.result_delay());
        let this = self.clone();
        let task = async move {
            sleep.await;
            if !this.inner.generation.is_current(token) || this.mode() != GameMode::Daily {
                return;
            }
            let stats = this.daily_stats();
            this.emit_all(vec![
                SessionEvent::ConfettiChanged(result.won),
                SessionEvent::StreakChanged(stats.current_streak),
                SessionEvent::RoundFinished(result),
                SessionEvent::StatsChanged(stats),
            ]);
        };
        if let Err(err) = self.inner.services.spawner.spawn_local(task) {
            warn!(target: "daily", "Could not schedule result: {:?}", err);
        }
    }

    /// Skips exist only in the endless mode.
    pub async fn skip(&self) -> bool {
        match self.mode() {
            GameMode::Infinite => self.inner.infinite.skip().await,
            GameMode::Daily => false,
        }
    }

    pub fn use_hint(&self) -> bool {
        match self.mode() {
            GameMode::Infinite => self.inner.infinite.use_hint(),
            GameMode::Daily => false,
        }
    }

    pub async fn next_round(&self) -> bool {
        match self.mode() {
            GameMode::Infinite => self.inner.infinite.next_round().await,
            GameMode::Daily => false,
        }
    }

    pub async fn set_group_filter(&self, filter: GroupFilter) {
        self.inner.infinite.set_group_filter(filter).await;
    }

    pub fn submit_feedback(&self, category: FeedbackCategory, message: &str) -> bool {
        let message = message.trim();
        if message.is_empty() {
            return false;
        }
        match self
            .inner
            .services
            .telemetry
            .report_feedback(category, message)
        {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "session", "Feedback not delivered: {}", err);
                false
            }
        }
    }

    /// The renderer found the round on screen unusable.
    pub async fn report_display_fault(&self) {
        match self.mode() {
            GameMode::Infinite => {
                self.inner.infinite.recover_display().await;
            }
            GameMode::Daily => {
                warn!(target: "daily", "Daily display desync; reloading");
                self.inner.generation.bump();
                self.inner.daily.borrow_mut().round.clear();
                self.load_daily().await;
            }
        }
    }

    /// Host-requested save, e.g. when the page is hidden.
    pub fn persist_now(&self) -> bool {
        match self.mode() {
            GameMode::Infinite => self.inner.infinite.persist_now(),
            GameMode::Daily => {
                let daily = self.inner.daily.borrow();
                let Some(bucket_id) = daily.round.bucket_id() else {
                    return false;
                };
                if daily.round.phase.is_terminal() || daily.round.slots.guesses_made() == 0 {
                    return false;
                }
                let today = self.inner.services.clock.today();
                self.inner
                    .stats
                    .borrow()
                    .save_in_progress(today, bucket_id, daily.round.slots.slots());
                true
            }
        }
    }
}

impl Destroyable for PhotoController {
    fn destroy(&mut self) {
        self.inner.destroyed.set(true);
        self.inner.daily.borrow_mut().timers.cancel();
        self.inner.generation.bump();
        if self.mode() == GameMode::Infinite {
            self.inner.infinite.suspend();
        }
        debug!(target: "session", "Photo controller torn down");
    }
}

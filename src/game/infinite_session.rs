use futures::task::LocalSpawnExt;
use log::{debug, info, trace, warn};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::SystemTime;
use uuid::Uuid;

use super::generation::Generation;
use super::prefetch::{draw_batch, PrefetchBuffer};
use super::repositories::{Preferences, SeenPoolRepository, SnapshotRepository};
use super::round_state::{GuessOutcome, PendingGuess, RoundState};
use super::services::Services;
use super::settings::Settings;
use super::single_flight::SingleFlight;
use super::stats_tracker::{RoundOutcome, StatsTracker};
use super::variant_policy::VariantPolicy;
use crate::destroyable::Destroyable;
use crate::events::EventEmitter;
use crate::model::{
    GroupFilter, GuessRow, GuessSlot, HintReveal, HintState, KeyInput, Round, RoundResult,
    SavedRound, SessionEvent, SessionPhase, SessionSnapshot, SlotOutcome, StatsRecord,
};

const MAX_ADVANCE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Flight {
    Advance,
    Prefetch,
}

struct SessionState {
    run_id: Uuid,
    round: RoundState,
    buffer: PrefetchBuffer,
    skips_remaining: u32,
    hint: HintState,
    streak: u32,
    group_filter: GroupFilter,
    /// Set between retiring a round and putting the next one on screen.
    advancing: bool,
    /// Set right after a round is loaded or restored; swallows the next
    /// host-requested save.
    just_loaded: bool,
}

struct Inner<P: VariantPolicy> {
    state: RefCell<SessionState>,
    services: Services,
    settings: Settings,
    stats: RefCell<StatsTracker>,
    snapshots: SnapshotRepository,
    seen: SeenPoolRepository,
    prefs: Preferences,
    flights: SingleFlight<Flight, ()>,
    generation: Generation,
    emitter: EventEmitter<SessionEvent>,
    _policy: PhantomData<P>,
}

/// Endless play for one variant: rounds drawn from a prefetched pool, a
/// streak that runs until a loss, and a snapshot so a reload resumes the
/// round in progress.
pub struct InfiniteSession<P: VariantPolicy> {
    inner: Rc<Inner<P>>,
}

impl<P: VariantPolicy> Clone for InfiniteSession<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: VariantPolicy> InfiniteSession<P> {
    pub fn new(services: Services, settings: Settings, emitter: EventEmitter<SessionEvent>) -> Self {
        let store = Rc::clone(&services.store);
        let prefs = Preferences::new(Rc::clone(&store));
        let state = SessionState {
            run_id: Uuid::new_v4(),
            round: RoundState::new(P::SLOT_COUNT),
            buffer: PrefetchBuffer::new(),
            skips_remaining: settings.skip_budget,
            hint: HintState::default(),
            streak: 0,
            group_filter: prefs.group_filter(P::FILTER_KEY),
            advancing: false,
            just_loaded: false,
        };
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(state),
                stats: RefCell::new(StatsTracker::new(
                    Rc::clone(&store),
                    Rc::clone(&services.clock),
                    P::STATS_MODE,
                )),
                snapshots: SnapshotRepository::new(Rc::clone(&store), P::SNAPSHOT_KEY),
                seen: SeenPoolRepository::new(store, P::SEEN_KEY),
                prefs,
                services,
                settings,
                flights: SingleFlight::new(),
                generation: Generation::new(),
                emitter,
                _policy: PhantomData,
            }),
        }
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.inner.emitter.emit(event);
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().round.phase
    }

    pub fn round(&self) -> Option<Round> {
        self.inner.state.borrow().round.round.clone()
    }

    pub fn bucket_id(&self) -> Option<String> {
        self.inner.state.borrow().round.bucket_id().map(str::to_string)
    }

    pub fn slots(&self) -> Vec<GuessSlot> {
        self.inner.state.borrow().round.slots.slots().to_vec()
    }

    pub fn input(&self) -> String {
        self.inner.state.borrow().round.input.clone()
    }

    pub fn skips_remaining(&self) -> u32 {
        self.inner.state.borrow().skips_remaining
    }

    pub fn streak(&self) -> u32 {
        self.inner.state.borrow().streak
    }

    pub fn group_filter(&self) -> GroupFilter {
        self.inner.state.borrow().group_filter
    }

    pub fn buffered(&self) -> usize {
        self.inner.state.borrow().buffer.remaining()
    }

    pub fn stats(&self) -> StatsRecord {
        self.inner.stats.borrow().record().clone()
    }

    pub fn hint(&self) -> Option<HintReveal> {
        let state = self.inner.state.borrow();
        let round = state.round.round.as_ref()?;
        if state.hint.is_revealed_for(&round.bucket_id) {
            P::hint_for(round)
        } else {
            None
        }
    }

    pub fn hint_available(&self) -> bool {
        let state = self.inner.state.borrow();
        match &state.round.round {
            Some(round) => {
                !state.hint.used && !state.round.phase.is_terminal() && P::hint_for(round).is_some()
            }
            None => false,
        }
    }

    fn view_events(state: &SessionState) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Some(round) = &state.round.round {
            events.push(SessionEvent::RoundStarted {
                bucket_id: round.bucket_id.clone(),
                display: round.display.clone(),
                slot_count: P::SLOT_COUNT,
            });
            events.push(SessionEvent::SlotsChanged(state.round.slots.slots().to_vec()));
            match P::hint_for(round).filter(|_| state.hint.is_revealed_for(&round.bucket_id)) {
                Some(reveal) => events.push(SessionEvent::HintRevealed(reveal)),
                None => events.push(SessionEvent::HintCleared),
            }
        }
        events.push(SessionEvent::InputChanged(state.round.input.clone()));
        events.push(SessionEvent::ConfettiChanged(state.round.confetti));
        events.push(SessionEvent::PhaseChanged(state.round.phase));
        events.push(SessionEvent::SkipsChanged(state.skips_remaining));
        events.push(SessionEvent::StreakChanged(state.streak));
        events
    }

    /// Re-emits the full view, e.g. after a renderer (re)subscribes.
    pub fn refresh_view(&self) {
        let events = Self::view_events(&self.inner.state.borrow());
        self.emit_all(events);
    }

    /// Mount: resume the saved session if it is still usable, otherwise
    /// start a fresh round.
    pub async fn start(&self) {
        if self.try_resume() {
            self.schedule_refill_if_low();
            return;
        }
        self.advance().await;
    }

    fn discard_snapshot(&self, reason: &str) {
        warn!(target: "session", "Discarding {} snapshot: {}", P::NAME, reason);
        self.inner.snapshots.clear();
    }

    /// Restores the persisted snapshot. Returns `false`, leaving state
    /// untouched, when there is nothing usable to restore.
    pub fn try_resume(&self) -> bool {
        let Some(snapshot) = self.inner.snapshots.load() else {
            return false;
        };
        if !P::snapshot_is_valid(&snapshot) {
            self.discard_snapshot("missing required fields");
            return false;
        }
        let filter = self.group_filter();
        if snapshot.group_filter != filter || !filter.admits(snapshot.current.category) {
            self.discard_snapshot("saved under a different group filter");
            return false;
        }
        let Some(round) = snapshot.current.to_round() else {
            self.discard_snapshot("answer does not decode");
            return false;
        };
        if !round.is_renderable() {
            self.discard_snapshot("round cannot be displayed");
            return false;
        }
        let slots = GuessRow::restore(&snapshot.slots, P::SLOT_COUNT);
        if slots.is_terminal() {
            self.discard_snapshot("round already finished");
            return false;
        }

        let mut buffer = PrefetchBuffer::restore(snapshot.pending_rounds());
        buffer.retain_admitted(filter);

        let events = {
            let mut state = self.inner.state.borrow_mut();
            state.run_id = snapshot.run_id;
            state.round.start(round, Some(slots));
            state.buffer = buffer;
            state.skips_remaining = snapshot.skips_remaining.min(self.inner.settings.skip_budget);
            state.hint = snapshot.hint;
            state.streak = snapshot.streak;
            state.advancing = false;
            state.just_loaded = true;
            info!(
                target: "session",
                "Resumed {} round {} ({} guesses left, {} buffered)",
                P::NAME,
                snapshot.current.bucket_id,
                state.round.slots.remaining(),
                state.buffer.remaining()
            );
            Self::view_events(&state)
        };
        self.emit_all(events);
        true
    }

    /// Puts the next buffered round on screen, fetching first when the
    /// buffer is empty. Concurrent callers share one advance.
    pub async fn advance(&self) {
        let this = self.clone();
        self.inner
            .flights
            .run(Flight::Advance, move || async move { this.advance_inner().await })
            .await
    }

    async fn advance_inner(&self) {
        let mut next = None;
        for attempt in 0..MAX_ADVANCE_ATTEMPTS {
            let token = self.inner.generation.current();
            let taken = {
                let mut state = self.inner.state.borrow_mut();
                state.advancing = true;
                state.buffer.take_next()
            };
            if taken.is_some() {
                next = taken;
                break;
            }

            let events = {
                let mut state = self.inner.state.borrow_mut();
                state.round.clear();
                vec![SessionEvent::PhaseChanged(SessionPhase::Loading)]
            };
            self.emit_all(events);

            self.refill().await;
            if !self.inner.generation.is_current(token) {
                debug!(target: "session", "Advance attempt {} went stale; retrying", attempt + 1);
                continue;
            }
            next = self.inner.state.borrow_mut().buffer.take_next();
            break;
        }

        let started = next.is_some();
        let events = {
            let mut state = self.inner.state.borrow_mut();
            state.advancing = false;
            match next {
                Some(round) => {
                    info!(target: "session", "{} round {} started", P::NAME, round.bucket_id);
                    state.round.start(round, None);
                    Self::view_events(&state)
                }
                None => {
                    warn!(target: "session", "No {} round available; staying in loading", P::NAME);
                    state.round.clear();
                    vec![SessionEvent::PhaseChanged(SessionPhase::Loading)]
                }
            }
        };
        self.emit_all(events);
        if started {
            self.write_snapshot();
            self.inner.state.borrow_mut().just_loaded = true;
        }
        self.schedule_refill_if_low();
    }

    /// Tops the lookahead buffer up with a fresh batch. Concurrent callers
    /// share one request.
    pub async fn refill(&self) {
        let this = self.clone();
        self.inner
            .flights
            .run(Flight::Prefetch, move || async move { this.refill_inner().await })
            .await
    }

    async fn refill_inner(&self) {
        let token = self.inner.generation.current();
        let filter = self.group_filter();
        let batch = draw_batch(
            Rc::clone(&self.inner.services.source),
            self.inner.seen.clone(),
            P::DOMAIN,
            self.inner.settings.prefetch_batch_size,
            filter,
        )
        .await;
        if !self.inner.generation.is_current(token) {
            debug!(target: "prefetch", "Discarding stale {} batch of {}", P::NAME, batch.len());
            return;
        }
        let added = self.inner.state.borrow_mut().buffer.append(batch);
        debug!(
            target: "prefetch",
            "{} buffer +{} (now {})",
            P::NAME,
            added,
            self.buffered()
        );
    }

    fn schedule_refill_if_low(&self) {
        let low = self
            .inner
            .state
            .borrow()
            .buffer
            .needs_refill(self.inner.settings.refill_threshold);
        if !low || self.inner.flights.is_in_flight(&Flight::Prefetch) {
            return;
        }
        let this = self.clone();
        if let Err(err) = self
            .inner
            .services
            .spawner
            .spawn_local(async move { this.refill().await })
        {
            warn!(target: "prefetch", "Could not schedule refill: {:?}", err);
        }
    }

    pub fn handle_input_key(&self, key: KeyInput) -> bool {
        let input = {
            let mut state = self.inner.state.borrow_mut();
            if !state.round.apply_key(key) {
                return false;
            }
            state.round.input.clone()
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
        let input = {
            let mut state = self.inner.state.borrow_mut();
            if !state.round.phase.accepts_input() {
                return;
            }
            state.round.input = text.to_string();
            state.round.input.clone()
        };
        self.inner.emitter.emit(SessionEvent::InputChanged(input));
    }

    pub async fn submit_guess(&self) -> GuessOutcome {
        let token = self.inner.generation.current();
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            match state.round.begin_guess(P::ACCEPTS_ALT_ANSWER) {
                Ok(pending) => pending,
                Err(reason) => return GuessOutcome::Rejected(reason),
            }
        };
        self.emit_all(vec![
            SessionEvent::InputChanged(String::new()),
            SessionEvent::PhaseChanged(SessionPhase::Animating),
        ]);
        if let Err(err) = self.inner.services.telemetry.report_guess(
            &pending.bucket_id,
            &pending.text,
            pending.correct,
            pending.guess_number,
        ) {
            debug!(target: "session", "Guess report failed: {}", err);
        }

        self.inner
            .services
            .clock
            .sleep(self.inner.settings.reveal_delay())
            .await;

        let (outcome, remaining, events) = {
            let mut state = self.inner.state.borrow_mut();
            let same_round = state.round.bucket_id() == Some(pending.bucket_id.as_str());
            if !self.inner.generation.is_current(token)
                || !same_round
                || state.round.phase != SessionPhase::Animating
            {
                debug!(target: "session", "Dropping guess {:?}: session moved on", pending.text);
                return GuessOutcome::Discarded;
            }
            let outcome = state.round.commit_guess(&pending);
            let events = vec![
                SessionEvent::SlotsChanged(state.round.slots.slots().to_vec()),
                SessionEvent::PhaseChanged(state.round.phase),
            ];
            (outcome, state.round.slots.remaining(), events)
        };
        self.emit_all(events);

        match outcome {
            SlotOutcome::InProgress => {
                self.write_snapshot();
                GuessOutcome::Incorrect {
                    guess_number: pending.guess_number,
                    remaining,
                }
            }
            SlotOutcome::Won => {
                self.finish_round(true, &pending);
                GuessOutcome::Won {
                    guess_number: pending.guess_number,
                }
            }
            SlotOutcome::Lost => {
                let answer = self.finish_round(false, &pending);
                GuessOutcome::Lost { answer }
            }
        }
    }

    /// Books a finished round; returns the answer.
    fn finish_round(&self, won: bool, last_guess: &PendingGuess) -> String {
        let today = self.inner.services.clock.today();
        let guess_count = last_guess.guess_number;
        let (answer, attempts, streak, skips) = {
            let mut state = self.inner.state.borrow_mut();
            let answer = state
                .round
                .round
                .as_ref()
                .map(|round| round.answer.clone())
                .unwrap_or_default();
            if won {
                state.streak += 1;
            } else {
                // the run is over: next round starts a new one
                state.streak = 0;
                state.skips_remaining = self.inner.settings.skip_budget;
                state.hint = HintState::default();
                state.run_id = Uuid::new_v4();
            }
            (
                answer,
                state.round.attempts.clone(),
                state.streak,
                state.skips_remaining,
            )
        };

        self.inner.snapshots.clear();
        if !won {
            self.inner.seen.clear();
        }
        let stats = {
            let mut tracker = self.inner.stats.borrow_mut();
            tracker.record_outcome(
                today,
                RoundOutcome {
                    won,
                    guess_count,
                    round_id: Some(last_guess.bucket_id.clone()),
                    answer: Some(answer.clone()),
                    attempts,
                },
            );
            tracker.record().clone()
        };
        if let Err(err) = self.inner.services.telemetry.report_round_outcome(
            &last_guess.bucket_id,
            guess_count,
            streak,
        ) {
            debug!(target: "session", "Outcome report failed: {}", err);
        }

        info!(
            target: "session",
            "{} round {} {} in {} (streak {})",
            P::NAME,
            last_guess.bucket_id,
            if won { "won" } else { "lost" },
            guess_count,
            streak
        );
        self.emit_all(vec![
            SessionEvent::ConfettiChanged(won),
            SessionEvent::StreakChanged(streak),
            SessionEvent::SkipsChanged(skips),
            SessionEvent::RoundFinished(RoundResult {
                bucket_id: last_guess.bucket_id.clone(),
                won,
                answer: answer.clone(),
                guess_count,
            }),
            SessionEvent::StatsChanged(stats),
        ]);
        self.schedule_auto_advance();
        answer
    }

    fn schedule_auto_advance(&self) {
        let Some(delay) = self.inner.settings.auto_advance() else {
            return;
        };
        let token = self.inner.generation.current();
        let Some(bucket_id) = self.bucket_id() else {
            return;
        };
        let this = self.clone();
        let sleep = self.inner.services.clock.sleep(delay);
        let task = async move {
            sleep.await;
            let still_showing = this.inner.generation.is_current(token)
                && this.bucket_id().as_deref() == Some(bucket_id.as_str())
                && this.phase().is_terminal();
            if still_showing {
                this.advance().await;
            }
        };
        if let Err(err) = self.inner.services.spawner.spawn_local(task) {
            warn!(target: "session", "Could not schedule auto-advance: {:?}", err);
        }
    }

    /// Moves past a finished round when auto-advance is off.
    pub async fn next_round(&self) -> bool {
        if !self.phase().is_terminal() {
            return false;
        }
        self.advance().await;
        true
    }

    /// Spends one skip and moves to a new round. A skip after at least one
    /// guess forfeits the streak and counts as a played game; a skip before
    /// any guess leaves stats alone.
    pub async fn skip(&self) -> bool {
        let (guesses_made, bucket_id, skips) = {
            let mut state = self.inner.state.borrow_mut();
            if state.skips_remaining == 0 {
                debug!(target: "session", "Skip ignored: budget exhausted");
                return false;
            }
            if state.advancing || !state.round.phase.accepts_input() {
                debug!(target: "session", "Skip ignored in {:?}", state.round.phase);
                return false;
            }
            let Some(bucket_id) = state.round.bucket_id().map(str::to_string) else {
                return false;
            };
            state.skips_remaining -= 1;
            let guesses_made = state.round.slots.guesses_made();
            if guesses_made > 0 {
                state.streak = 0;
            }
            (guesses_made, bucket_id, state.skips_remaining)
        };

        let mut events = vec![SessionEvent::SkipsChanged(skips)];
        if guesses_made > 0 {
            let today = self.inner.services.clock.today();
            let attempts = self.inner.state.borrow().round.attempts.clone();
            let stats = {
                let mut tracker = self.inner.stats.borrow_mut();
                tracker.record_outcome(
                    today,
                    RoundOutcome {
                        won: false,
                        guess_count: guesses_made,
                        round_id: Some(bucket_id.clone()),
                        answer: None,
                        attempts,
                    },
                );
                tracker.record().clone()
            };
            info!(target: "session", "Skipped {} after {} guesses; streak forfeited", bucket_id, guesses_made);
            events.push(SessionEvent::StreakChanged(0));
            events.push(SessionEvent::StatsChanged(stats));
        } else {
            debug!(target: "session", "Skipped {} before guessing", bucket_id);
        }
        self.emit_all(events);
        self.advance().await;
        true
    }

    /// Spends the run's hint on the current round.
    pub fn use_hint(&self) -> bool {
        let reveal = {
            let mut state = self.inner.state.borrow_mut();
            if !state.round.phase.accepts_input() {
                return false;
            }
            let Some(round) = state.round.round.clone() else {
                return false;
            };
            let Some(reveal) = P::hint_for(&round) else {
                debug!(target: "session", "Round {} has nothing to hint", round.bucket_id);
                return false;
            };
            if !state.hint.spend(&round.bucket_id) {
                return false;
            }
            reveal
        };
        self.inner.emitter.emit(SessionEvent::HintRevealed(reveal));
        self.write_snapshot();
        true
    }

    pub async fn set_group_filter(&self, filter: GroupFilter) {
        self.inner.prefs.set_group_filter(P::FILTER_KEY, filter);
        let keep_round = {
            let mut state = self.inner.state.borrow_mut();
            if state.group_filter == filter {
                return;
            }
            state.group_filter = filter;
            let current_fits = state
                .round
                .round
                .as_ref()
                .map(|round| filter.admits(round.category))
                .unwrap_or(false);
            current_fits && state.round.phase.accepts_input()
        };
        self.inner.generation.bump();
        info!(target: "session", "{} group filter now {:?}", P::NAME, filter);

        if keep_round {
            self.inner.state.borrow_mut().buffer.retain_admitted(filter);
            self.write_snapshot();
            self.schedule_refill_if_low();
            return;
        }

        self.inner.snapshots.clear();
        {
            let mut state = self.inner.state.borrow_mut();
            state.buffer.clear();
            state.round.clear();
        }
        self.emit_all(vec![SessionEvent::PhaseChanged(SessionPhase::Loading)]);
        self.advance().await;
    }

    /// Builds and writes the snapshot for the round on screen. Never writes
    /// mid-transition or for a finished round.
    fn write_snapshot(&self) -> bool {
        let snapshot = {
            let mut state = self.inner.state.borrow_mut();
            state.just_loaded = false;
            if state.advancing {
                trace!(target: "session", "Not saving mid-advance");
                return false;
            }
            let Some(round) = &state.round.round else {
                return false;
            };
            if state.round.slots.len() != P::SLOT_COUNT || state.round.phase.is_terminal() {
                return false;
            }
            SessionSnapshot {
                version: 2,
                run_id: state.run_id,
                current: SavedRound::from_round(round),
                slots: state.round.slots.slots().to_vec(),
                skips_remaining: state.skips_remaining,
                hint: state.hint.clone(),
                streak: state.streak,
                group_filter: state.group_filter,
                buffer: state.buffer.pending().iter().map(SavedRound::from_round).collect(),
                buffer_index: 0,
                saved_at: SystemTime::from(self.inner.services.clock.now()),
            }
        };
        self.inner.snapshots.save(&snapshot)
    }

    /// Host-requested save (page hide, mode switch). Skipped once right after
    /// a round was loaded, since nothing has changed yet.
    pub fn persist_now(&self) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.just_loaded {
                state.just_loaded = false;
                trace!(target: "session", "Suppressing save right after load");
                return false;
            }
        }
        self.write_snapshot()
    }

    /// Leaves the screen: saves the round in progress and invalidates any
    /// pending animation.
    pub fn suspend(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.round.reset_transient();
            state.just_loaded = false;
        }
        self.write_snapshot();
        self.inner.generation.bump();
    }

    /// Comes back on screen with fresh transient flags; loads a round if
    /// there is none.
    pub async fn activate(&self) {
        let has_round = {
            let mut state = self.inner.state.borrow_mut();
            state.round.reset_transient();
            state.round.round.is_some()
        };
        if has_round {
            self.refresh_view();
        } else {
            self.start().await;
        }
    }

    pub fn display_is_valid(&self) -> bool {
        self.inner
            .state
            .borrow()
            .round
            .round
            .as_ref()
            .map(Round::is_renderable)
            .unwrap_or(true)
    }

    /// Recovery for a round that reached the screen without what it needs to
    /// render. Rebuilds from the last good snapshot, or starts over.
    pub async fn recover_display(&self) -> bool {
        warn!(target: "session", "{} display desync; recovering", P::NAME);
        self.inner.generation.bump();
        {
            let mut state = self.inner.state.borrow_mut();
            state.round.clear();
            state.advancing = false;
        }
        if self.try_resume() {
            return true;
        }
        self.inner.snapshots.clear();
        self.inner.state.borrow_mut().buffer.clear();
        self.advance().await;
        false
    }

    /// Runs recovery if the round on screen cannot be rendered.
    pub async fn check_display(&self) -> bool {
        if self.display_is_valid() {
            return true;
        }
        self.recover_display().await;
        false
    }
}

impl<P: VariantPolicy> Destroyable for InfiniteSession<P> {
    fn destroy(&mut self) {
        self.suspend();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::round_state::GuessRejected;
    use crate::game::variant_policy::{HangulPolicy, PhotoPolicy};
    use crate::model::{GroupCategory, RoundDisplay};
    use crate::storage::StorageKey;
    use crate::testing::{hangul_round, photo_round, Harness};
    use crate::tests::UsingLogger;
    use test_context::test_context;
    use GuessSlot::*;

    fn photo_session(h: &Harness) -> InfiniteSession<PhotoPolicy> {
        InfiniteSession::new(h.services(), h.settings.clone(), h.emitter.clone())
    }

    fn hangul_session(h: &Harness) -> InfiniteSession<HangulPolicy> {
        InfiniteSession::new(h.services(), h.settings.clone(), h.emitter.clone())
    }

    fn guess<P: VariantPolicy>(h: &Harness, session: &InfiniteSession<P>, text: &str) -> GuessOutcome {
        session.set_input(text);
        h.settle(session.submit_guess())
    }

    fn girl(id: &str, answer: &str) -> Round {
        photo_round(id, answer, GroupCategory::GirlGroup)
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_jisoo_won_on_second_guess(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b-jisoo", "JISOO"), girl("b-lisa", "LISA")]);
        let session = photo_session(&h);
        h.settle(session.start());
        assert_eq!(session.bucket_id().as_deref(), Some("b-jisoo"));

        assert_eq!(
            guess(&h, &session, "LISA"),
            GuessOutcome::Incorrect {
                guess_number: 1,
                remaining: 5
            }
        );
        assert_eq!(guess(&h, &session, "jisoo"), GuessOutcome::Won { guess_number: 2 });
        assert_eq!(session.slots(), vec![Incorrect, Correct, Empty, Empty, Empty, Empty]);
        assert_eq!(session.phase(), SessionPhase::Won);
        assert_eq!(session.streak(), 1);
        assert!(h.snapshot(StorageKey::InfiniteSnapshot).is_none());

        let reports = h.telemetry.outcomes();
        assert_eq!(reports, vec![("b-jisoo".to_string(), 2, 1)]);
        let guesses = h.telemetry.guesses();
        assert_eq!(guesses.last(), Some(&("b-jisoo".to_string(), "JISOO".to_string(), true, 2)));
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_hangul_three_misses_lose(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![
            hangul_round("h-iu", "IU", "아이유"),
            hangul_round("h-2", "TAEYEON", "태연"),
            hangul_round("h-3", "JENNIE", "제니"),
            hangul_round("h-4", "KARINA", "카리나"),
        ]);
        let session = hangul_session(&h);
        h.settle(session.start());
        assert_eq!(h.seen(StorageKey::HangulSeen).len(), 4);

        guess(&h, &session, "LISA");
        guess(&h, &session, "ROSE");
        assert_eq!(
            guess(&h, &session, "V"),
            GuessOutcome::Lost {
                answer: "IU".to_string()
            }
        );
        assert_eq!(session.slots(), vec![Incorrect, Incorrect, Incorrect]);
        assert_eq!(session.phase(), SessionPhase::Lost);
        assert_eq!(session.streak(), 0);
        assert_eq!(session.stats().games_played, 1);
        assert_eq!(session.stats().wins, 0);
        // a lost run forgets what it has seen
        assert!(h.seen(StorageKey::HangulSeen).is_empty());
        assert!(h.snapshot(StorageKey::HangulSnapshot).is_none());
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_guess_ignored_while_animating(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());

        session.set_input("LISA");
        let first = h.spawn({
            let session = session.clone();
            async move { session.submit_guess().await }
        });
        h.run_until_stalled();
        assert_eq!(session.phase(), SessionPhase::Animating);

        // typing and submitting are both locked out, nothing is queued
        assert!(!session.handle_input_key(KeyInput::Char('R')));
        session.set_input("ROSE");
        assert_eq!(
            h.settle(session.submit_guess()),
            GuessOutcome::Rejected(GuessRejected::EmptyInput)
        );

        h.fire_all_sleeps();
        assert!(matches!(first.take(), Some(GuessOutcome::Incorrect { .. })));
        assert_eq!(session.slots()[..2], [Incorrect, Empty]);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_guess_rejected_after_round_over(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "JISOO");
        assert_eq!(
            guess(&h, &session, "LISA"),
            GuessOutcome::Rejected(GuessRejected::EmptyInput)
        );
        session.inner.state.borrow_mut().round.input = "LISA".to_string();
        assert_eq!(
            h.settle(session.submit_guess()),
            GuessOutcome::Rejected(GuessRejected::RoundOver)
        );
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_snapshot_saved_after_miss_and_resumed(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source
            .push_batch(vec![girl("b1", "JISOO"), girl("b2", "LISA"), girl("b3", "ROSE")]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "WRONG");
        assert!(session.use_hint());

        let snapshot = h.snapshot(StorageKey::InfiniteSnapshot).unwrap();
        assert_eq!(snapshot.current.bucket_id, "b1");
        assert_eq!(snapshot.slots[0], Incorrect);
        assert!(snapshot.hint.is_revealed_for("b1"));
        assert_eq!(snapshot.buffer.len(), 2);

        // reload
        let reloaded = photo_session(&h);
        h.settle(reloaded.start());
        assert_eq!(reloaded.bucket_id().as_deref(), Some("b1"));
        assert_eq!(reloaded.slots(), session.slots());
        assert_eq!(
            reloaded.hint(),
            Some(HintReveal::GroupName("BLACKPINK".to_string()))
        );
        assert_eq!(reloaded.buffered(), 2);
        assert_eq!(reloaded.round().unwrap().answer, "JISOO");
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_invalid_snapshot_is_discarded(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "WRONG");

        let mut snapshot = h.snapshot(StorageKey::InfiniteSnapshot).unwrap();
        snapshot.current.answer_token = String::new();
        h.put_snapshot(StorageKey::InfiniteSnapshot, &snapshot);

        h.source.push_batch(vec![girl("b9", "WINTER")]);
        let reloaded = photo_session(&h);
        h.settle(reloaded.start());
        assert_eq!(reloaded.bucket_id().as_deref(), Some("b9"));
        assert_eq!(reloaded.slots(), vec![Empty; 6]);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_snapshot_from_other_filter_is_discarded(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let photo = photo_session(&h);
        h.settle(photo.start());
        guess(&h, &photo, "WRONG");
        assert!(h.snapshot(StorageKey::InfiniteSnapshot).is_some());

        Preferences::new(h.store.clone())
            .set_group_filter(StorageKey::PhotoGroupFilter, GroupFilter::BoyGroup);
        h.source
            .push_batch(vec![photo_round("m1", "JIMIN", GroupCategory::BoyGroup)]);
        let reloaded = photo_session(&h);
        h.settle(reloaded.start());
        assert_eq!(reloaded.bucket_id().as_deref(), Some("m1"));
        let request = h.source.batch_requests().pop().unwrap();
        assert_eq!(request.group_filter, GroupFilter::BoyGroup);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_resume_never_exceeds_slot_count(_: &mut UsingLogger) {
        let h = Harness::new();
        let round = hangul_round("h1", "IU", "아이유");
        let snapshot = SessionSnapshot {
            version: 2,
            run_id: Uuid::new_v4(),
            current: SavedRound::from_round(&round),
            slots: vec![Incorrect, Empty, Empty, Empty, Empty, Empty],
            skips_remaining: 99,
            hint: HintState::default(),
            streak: 4,
            group_filter: GroupFilter::Both,
            buffer: vec![],
            buffer_index: 0,
            saved_at: SystemTime::UNIX_EPOCH,
        };
        h.put_snapshot(StorageKey::HangulSnapshot, &snapshot);

        let session = hangul_session(&h);
        assert!(session.try_resume());
        assert_eq!(session.slots(), vec![Incorrect, Empty, Empty]);
        assert_eq!(session.skips_remaining(), h.settings.skip_budget);
        assert_eq!(session.streak(), 4);
        assert!(matches!(
            session.round().unwrap().display,
            RoundDisplay::Hangul(_)
        ));
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_skip_budget(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch((0..8).map(|i| girl(&format!("b{i}"), "X")).collect());
        let session = photo_session(&h);
        h.settle(session.start());
        let budget = h.settings.skip_budget;

        for used in 1..=budget {
            assert!(h.settle(session.skip()));
            assert_eq!(session.skips_remaining(), budget - used);
        }
        let before = session.bucket_id();
        assert!(!h.settle(session.skip()));
        assert_eq!(session.skips_remaining(), 0);
        assert_eq!(session.bucket_id(), before);
        // silent skips never touch stats
        assert_eq!(session.stats().games_played, 0);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_skip_after_guess_forfeits_streak(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![
            girl("b1", "JISOO"),
            girl("b2", "LISA"),
            girl("b3", "ROSE"),
            girl("b4", "JENNIE"),
            girl("b5", "KARINA"),
            girl("b6", "WINTER"),
        ]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "JISOO");
        h.settle(session.next_round());
        assert_eq!(session.streak(), 1);

        guess(&h, &session, "WRONG");
        assert!(h.settle(session.skip()));
        assert_eq!(session.streak(), 0);
        assert_eq!(session.bucket_id().as_deref(), Some("b3"));
        let stats = session.stats();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.current_streak, 0);
        // not a lost run: the seen pool survives
        assert!(!h.seen(StorageKey::InfiniteSeen).is_empty());
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_hint_once_per_run(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO"), girl("b2", "LISA")]);
        let session = photo_session(&h);
        h.settle(session.start());
        assert!(session.hint_available());
        assert!(session.use_hint());
        assert!(!session.use_hint());
        assert_eq!(
            session.hint(),
            Some(HintReveal::GroupName("BLACKPINK".to_string()))
        );

        guess(&h, &session, "JISOO");
        h.settle(session.next_round());
        assert_eq!(session.hint(), None);
        assert!(!session.use_hint());
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_hangul_hint_needs_an_image(_: &mut UsingLogger) {
        let h = Harness::new();
        let mut with_image = hangul_round("h2", "IU", "아이유");
        if let RoundDisplay::Hangul(display) = &mut with_image.display {
            display.image = Some("iu.jpg".to_string());
        }
        h.source
            .push_batch(vec![hangul_round("h1", "TAEYEON", "태연"), with_image]);
        let session = hangul_session(&h);
        h.settle(session.start());
        assert!(!session.use_hint());
        h.settle(session.skip());
        assert!(session.use_hint());
        assert_eq!(session.hint(), Some(HintReveal::Image("iu.jpg".to_string())));
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_prefetch_refills_near_exhaustion(_: &mut UsingLogger) {
        let mut settings = Settings::default();
        settings.prefetch_batch_size = 4;
        settings.auto_advance_ms = None;
        let h = Harness::with_settings(settings);
        h.source.push_batch((0..4).map(|i| girl(&format!("a{i}"), "X")).collect());
        h.source.push_batch((0..4).map(|i| girl(&format!("b{i}"), "X")).collect());
        let session = photo_session(&h);
        h.settle(session.start());
        assert_eq!(h.source.batch_requests().len(), 1);
        assert_eq!(session.buffered(), 3);

        h.settle(session.skip());
        h.run_until_stalled();
        // two left after taking a1: refill kicked in
        assert_eq!(h.source.batch_requests().len(), 2);
        assert_eq!(session.buffered(), 6);
        let second = &h.source.batch_requests()[1];
        assert!(second.excluding.contains("a0"));
        assert!(second.excluding.contains("a3"));
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_concurrent_advances_fetch_once(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.hold_batches();
        let session = photo_session(&h);
        let a = h.spawn({
            let session = session.clone();
            async move { session.advance().await }
        });
        let b = h.spawn({
            let session = session.clone();
            async move { session.advance().await }
        });
        let c = h.spawn({
            let session = session.clone();
            async move { session.refill().await }
        });
        h.run_until_stalled();
        assert_eq!(h.source.batch_requests().len(), 1);

        h.source.release_batch(vec![girl("b1", "JISOO"), girl("b2", "LISA")]);
        h.run_until_stalled();
        assert!(a.take().is_some() && b.take().is_some() && c.take().is_some());
        assert_eq!(session.bucket_id().as_deref(), Some("b1"));
        assert_eq!(session.buffered(), 1);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_failed_fetch_stays_loading(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.fail_next_batch();
        let session = photo_session(&h);
        h.settle(session.start());
        assert_eq!(session.phase(), SessionPhase::Loading);
        assert!(session.round().is_none());

        // retry by calling the same routine
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        h.settle(session.start());
        assert_eq!(session.phase(), SessionPhase::AwaitingInput);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_stale_batch_after_filter_change_is_dropped(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.hold_batches();
        let session = photo_session(&h);
        let started = h.spawn({
            let session = session.clone();
            async move { session.start().await }
        });
        h.run_until_stalled();

        let switched = h.spawn({
            let session = session.clone();
            async move { session.set_group_filter(GroupFilter::BoyGroup).await }
        });
        h.run_until_stalled();
        h.source.release_batch(vec![girl("g1", "JISOO")]);
        h.run_until_stalled();
        h.source
            .release_batch(vec![photo_round("m1", "JIMIN", GroupCategory::BoyGroup)]);
        h.run_until_stalled();

        assert!(started.take().is_some());
        assert!(switched.take().is_some());
        assert_eq!(session.bucket_id().as_deref(), Some("m1"));
        assert_eq!(session.buffered(), 0);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_filter_change_keeps_matching_round(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![
            girl("g1", "JISOO"),
            photo_round("m1", "JIMIN", GroupCategory::BoyGroup),
            girl("g2", "LISA"),
        ]);
        let session = photo_session(&h);
        h.settle(session.start());
        h.settle(session.set_group_filter(GroupFilter::GirlGroup));
        assert_eq!(session.bucket_id().as_deref(), Some("g1"));
        assert_eq!(session.buffered(), 1);
        let snapshot = h.snapshot(StorageKey::InfiniteSnapshot).unwrap();
        assert_eq!(snapshot.group_filter, GroupFilter::GirlGroup);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_auto_advance_after_win(_: &mut UsingLogger) {
        let mut settings = Settings::default();
        settings.auto_advance_ms = Some(1000);
        let h = Harness::with_settings(settings);
        h.source.push_batch(vec![girl("b1", "JISOO"), girl("b2", "LISA")]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "JISOO");
        assert_eq!(session.phase(), SessionPhase::Won);

        h.fire_all_sleeps();
        assert_eq!(session.bucket_id().as_deref(), Some("b2"));
        assert_eq!(session.phase(), SessionPhase::AwaitingInput);
        assert_eq!(session.streak(), 1);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_persist_now_guards(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());
        // fresh round was written during advance; the immediate re-save is swallowed
        assert!(!session.persist_now());
        assert!(session.persist_now());

        session.inner.state.borrow_mut().advancing = true;
        assert!(!session.persist_now());
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_suspend_discards_pending_animation(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());

        session.set_input("LISA");
        let pending = h.spawn({
            let session = session.clone();
            async move { session.submit_guess().await }
        });
        h.run_until_stalled();
        session.suspend();
        h.fire_all_sleeps();
        assert_eq!(pending.take(), Some(GuessOutcome::Discarded));
        assert_eq!(session.slots(), vec![Empty; 6]);
        assert_eq!(session.phase(), SessionPhase::AwaitingInput);
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_recover_display_from_snapshot(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO"), girl("b2", "LISA")]);
        let session = photo_session(&h);
        h.settle(session.start());
        guess(&h, &session, "WRONG");

        // corrupt what is on screen only
        if let Some(round) = session.inner.state.borrow_mut().round.round.as_mut() {
            round.display = RoundDisplay::Photo(Default::default());
        }
        assert!(!session.display_is_valid());
        assert!(!h.settle(session.check_display()));
        assert_eq!(session.bucket_id().as_deref(), Some("b1"));
        assert_eq!(session.slots()[0], Incorrect);
        assert!(session.display_is_valid());
    }

    #[test_context(UsingLogger)]
    #[test]
    fn test_recover_display_without_snapshot_starts_fresh(_: &mut UsingLogger) {
        let h = Harness::new();
        h.source.push_batch(vec![girl("b1", "JISOO")]);
        let session = photo_session(&h);
        h.settle(session.start());
        h.put_raw(StorageKey::InfiniteSnapshot, "garbage");
        if let Some(round) = session.inner.state.borrow_mut().round.round.as_mut() {
            round.display = RoundDisplay::Photo(Default::default());
        }

        h.source.push_batch(vec![girl("b7", "KARINA")]);
        assert!(!h.settle(session.recover_display()));
        assert_eq!(session.bucket_id().as_deref(), Some("b7"));
    }
}

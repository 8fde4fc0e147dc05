use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::events::{EventHandler, EventObserver, Unsubscriber};
use crate::model::{
    BucketId, GameMode, GuessSlot, HintReveal, RoundDisplay, RoundResult, SessionEvent,
    SessionPhase, StatsRecord,
};

/// Latest state of a controller as seen through its events.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub mode: Option<GameMode>,
    pub phase: SessionPhase,
    pub bucket_id: Option<BucketId>,
    pub display: Option<RoundDisplay>,
    pub slots: Vec<GuessSlot>,
    pub input: String,
    pub hint: Option<HintReveal>,
    pub skips_remaining: Option<u32>,
    pub streak: u32,
    pub confetti: bool,
    pub countdown: Option<Duration>,
    pub last_result: Option<RoundResult>,
    pub stats: Option<StatsRecord>,
    pub rounds_started: usize,
}

impl SessionView {
    pub fn remaining_guesses(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| **slot == GuessSlot::Empty)
            .count()
    }

    /// Image the renderer should show right now, if the round has one.
    pub fn current_image(&self) -> Option<&str> {
        match self.display.as_ref()? {
            RoundDisplay::Photo(photo) => {
                let guesses = self.slots.len() - self.remaining_guesses();
                photo.tier_for(guesses, self.phase.is_terminal())
            }
            RoundDisplay::Hangul(hangul) => match &self.hint {
                Some(HintReveal::Image(image)) => Some(image.as_str()),
                _ if self.phase.is_terminal() => hangul.revealable_image(),
                _ => None,
            },
        }
    }
}

pub struct SessionProjection {
    view: SessionView,
}

impl SessionProjection {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            view: SessionView::default(),
        }))
    }

    /// Creates a projection fed by `observer`.
    pub fn attach(
        observer: &EventObserver<SessionEvent>,
    ) -> (Rc<RefCell<Self>>, Unsubscriber<SessionEvent>) {
        let projection = Self::new();
        let handler = Rc::clone(&projection);
        let subscription = observer.subscribe(move |event| {
            handler.borrow_mut().handle_event(event);
        });
        (projection, subscription)
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }
}

impl EventHandler<SessionEvent> for SessionProjection {
    fn handle_event(&mut self, event: &SessionEvent) {
        let view = &mut self.view;
        match event {
            SessionEvent::ModeChanged(mode) => view.mode = Some(*mode),
            SessionEvent::PhaseChanged(phase) => view.phase = *phase,
            SessionEvent::RoundStarted {
                bucket_id,
                display,
                slot_count,
            } => {
                view.bucket_id = Some(bucket_id.clone());
                view.display = Some(display.clone());
                view.slots = vec![GuessSlot::Empty; *slot_count];
                view.hint = None;
                view.input.clear();
                view.rounds_started += 1;
            }
            SessionEvent::SlotsChanged(slots) => view.slots = slots.clone(),
            SessionEvent::InputChanged(input) => view.input = input.clone(),
            SessionEvent::HintRevealed(hint) => view.hint = Some(hint.clone()),
            SessionEvent::HintCleared => view.hint = None,
            SessionEvent::SkipsChanged(skips) => view.skips_remaining = Some(*skips),
            SessionEvent::StreakChanged(streak) => view.streak = *streak,
            SessionEvent::ConfettiChanged(confetti) => view.confetti = *confetti,
            SessionEvent::CountdownTick { remaining } => view.countdown = Some(*remaining),
            SessionEvent::RoundFinished(result) => view.last_result = Some(result.clone()),
            SessionEvent::StatsChanged(stats) => view.stats = Some(stats.clone()),
        }
    }
}

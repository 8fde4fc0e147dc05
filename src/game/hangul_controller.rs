use log::debug;

use super::infinite_session::InfiniteSession;
use super::round_state::GuessOutcome;
use super::services::Services;
use super::settings::Settings;
use super::variant_policy::HangulPolicy;
use crate::destroyable::Destroyable;
use crate::events::{Channel, EventObserver};
use crate::model::{GroupFilter, GuessSlot, HintReveal, KeyInput, SessionEvent, SessionPhase, StatsRecord};

/// The hangul game: three guesses at a name written in hangul, endless play
/// only, with its own stats, seen pool and snapshot.
#[derive(Clone)]
pub struct HangulController {
    session: InfiniteSession<HangulPolicy>,
    observer: EventObserver<SessionEvent>,
}

impl HangulController {
    pub fn new(services: Services, settings: Settings) -> Self {
        let (emitter, observer) = Channel::new();
        Self {
            session: InfiniteSession::new(services, settings, emitter),
            observer,
        }
    }

    pub fn observer(&self) -> EventObserver<SessionEvent> {
        self.observer.clone()
    }

    pub fn session(&self) -> &InfiniteSession<HangulPolicy> {
        &self.session
    }

    pub async fn start(&self) {
        self.session.start().await;
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn slots(&self) -> Vec<GuessSlot> {
        self.session.slots()
    }

    pub fn stats(&self) -> StatsRecord {
        self.session.stats()
    }

    pub fn hint(&self) -> Option<HintReveal> {
        self.session.hint()
    }

    pub async fn handle_key(&self, key: KeyInput) -> Option<GuessOutcome> {
        self.session.handle_key(key).await
    }

    pub fn set_input(&self, text: &str) {
        self.session.set_input(text);
    }

    pub async fn submit_guess(&self) -> GuessOutcome {
        self.session.submit_guess().await
    }

    pub async fn skip(&self) -> bool {
        self.session.skip().await
    }

    pub fn use_hint(&self) -> bool {
        self.session.use_hint()
    }

    pub async fn next_round(&self) -> bool {
        self.session.next_round().await
    }

    pub async fn set_group_filter(&self, filter: GroupFilter) {
        self.session.set_group_filter(filter).await;
    }

    pub async fn report_display_fault(&self) {
        self.session.recover_display().await;
    }

    pub fn persist_now(&self) -> bool {
        self.session.persist_now()
    }
}

impl Destroyable for HangulController {
    fn destroy(&mut self) {
        self.session.destroy();
        debug!(target: "session", "Hangul controller torn down");
    }
}

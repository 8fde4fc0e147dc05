#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Loading,
    AwaitingInput,
    Animating,
    Won,
    Lost,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Won | SessionPhase::Lost)
    }

    /// Input is only accepted between animations of a live round.
    pub fn accepts_input(&self) -> bool {
        *self == SessionPhase::AwaitingInput
    }
}

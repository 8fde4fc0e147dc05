pub mod clock;
mod countdown_timers;
mod generation;
pub mod hangul_controller;
pub mod infinite_session;
pub mod photo_controller;
pub mod prefetch;
pub mod repositories;
pub mod round_state;
pub mod services;
pub mod settings;
mod single_flight;
pub mod stats_tracker;
pub mod variant_policy;

pub use clock::{Clock, SystemClock};
pub use countdown_timers::{CountdownTimers, TimerFire};
pub use hangul_controller::HangulController;
pub use infinite_session::InfiniteSession;
pub use photo_controller::PhotoController;
pub use round_state::{GuessOutcome, GuessRejected};
pub use services::Services;
pub use settings::Settings;

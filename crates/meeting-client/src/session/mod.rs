//! Meeting session lifecycle.
//!
//! `state` holds the pure state machine, `actor` runs it against the
//! directory and the countdown timer.

mod actor;
mod messages;
pub mod state;
mod timer;

pub use actor::{MeetingSessionActor, MeetingSessionHandle, SessionDeps};
pub use messages::SessionSnapshot;
pub use state::{transition, InvalidTransition, SessionEvent, SessionState};
pub use timer::CountdownTimer;

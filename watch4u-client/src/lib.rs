pub mod coordinator;
pub mod hardware;
pub mod history;
pub mod selfie;
pub mod state_machine;
pub mod verifier;

pub use coordinator::{CheckInCoordinator, CheckInError};
pub use history::{CheckInHistory, CheckInRecord, InMemoryHistory, SqliteHistory};
pub use selfie::ApiSelfieSubmitter;
pub use state_machine::interpreter::EffectContext;
pub use state_machine::state::{
    CancellationReason, CapturedImage, CheckInState, ExamId, TagSerial, UserId,
};
pub use verifier::{ApiRosterSource, RosterTagVerifier};

//! Core library for the Watch4u desk agent: configuration, the exam
//! service API client, and the persisted sign-in session.

pub mod api;
pub mod config;
pub mod session;

pub use api::{ApiError, Exam, ExamApiClient, Room, RosterEntry, UploadImageResponse};
pub use config::Config;
pub use session::{Role, Session, SessionStore};

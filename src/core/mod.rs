//! Core orchestration: session lifecycle and the full/soft entry points

mod orchestrator;
mod session;

pub use orchestrator::{realtimeify, soft_realtimeify, Orchestrator};
pub use session::{
    Outcome, Session, SessionReport, SessionState, PRECONDITION_FAILURE_EXIT, SETUP_FAILURE_EXIT,
    TEARDOWN_FAILURE_EXIT,
};

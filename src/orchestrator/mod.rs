//! Conversational hype sessions.
//!
//! [`state`] holds the pure reducer; [`session`] runs it against real
//! collaborators.

pub mod session;
pub mod state;

pub use session::{ChatClosed, ChatDeps, ChatHandle, ChatOptions, ChatSession, ChatSnapshot};
pub use state::{
    CaptureId, ChatEffect, ChatEvent, ChatState, Conversation, Modality, RequestId,
};

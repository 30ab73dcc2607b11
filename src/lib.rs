//! Hype Buddy: short, personalized, spoken motivation.
//!
//! The crate turns a situation ("job interview in ten minutes") into a few
//! sentences of hype from a chosen persona and speaks them aloud:
//! Situation → Prompt (with past wins) → Generation → Voice
//!
//! # Architecture
//!
//! - **Service**: single-shot hypes, quota, outcome logging ([`service`])
//! - **Orchestrator**: multi-turn chat as a pure reducer plus a driver task
//! - **Memory**: recent wins injected into prompts, capped on the free tier
//! - **Generation**: remote language model behind [`generation::HypeGenerator`]
//! - **Voice**: remote speech synthesis with on-device fallback
//! - **Store**: SQLite persistence for sessions and the user profile

pub mod capture;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod generation;
pub mod hype_dirs;
pub mod memory;
pub mod orchestrator;
pub mod persona;
pub mod profile;
pub mod prompt;
pub mod reminder;
pub mod scenario;
pub mod service;
pub mod session;
pub mod store;
pub mod voice;

pub use config::HypeConfig;
pub use error::{HypeError, Result};
pub use orchestrator::{ChatHandle, ChatSession, ChatSnapshot, ChatState, Modality};
pub use persona::Persona;
pub use scenario::Scenario;
pub use service::{GeneratedHype, HypeRequest, HypeService, HypeStats, ServiceDeps};
pub use session::{HypeSession, Outcome, Turn};
pub use voice::VoiceDelivery;

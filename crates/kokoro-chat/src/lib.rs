//! Kokoro Chat crate - conversation orchestration for the companion.
//!
//! Drives one turn at a time from a spoken or typed utterance to a displayed
//! and spoken reply: capture, transcription, generation, emotion resolution,
//! memory replacement, synthesis and playback. Every backend failure is
//! absorbed into a fixed fallback message and the pipeline always returns
//! to `Idle`.

pub mod emotion;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod presentation;
pub mod session;
pub mod state;

pub use emotion::{classify, resolve, FALLBACK_EMOTION};
pub use error::ChatError;
pub use memory::MemoryStore;
pub use pipeline::{
    Backends, PipelineSettings, SessionView, SpeechOutcome, TurnFailure, TurnOutcome,
    TurnPipeline,
};
pub use presentation::{appearance, Appearance, NullSink, PresentationSink, RecordingSink};
pub use session::CompanionSession;
pub use state::{StateMachine, TurnId};

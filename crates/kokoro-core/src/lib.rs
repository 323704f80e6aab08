pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::KokoroConfig;
pub use error::{KokoroError, Result};
pub use events::PresentationEvent;
pub use types::*;

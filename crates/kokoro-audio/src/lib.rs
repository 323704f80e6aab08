//! Kokoro Audio crate - microphone capture and single-slot playback.
//!
//! Provides trait-based abstractions for the two exclusive audio resources
//! (microphone and audio output), the adapters that enforce their usage
//! rules, mock devices for testing, and file/command backed devices for the
//! terminal client.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use kokoro_core::error::KokoroError;

pub mod capture;
pub mod device;
pub mod mock;
pub mod playback;

pub use capture::CaptureAdapter;
pub use device::{CommandAudioOutput, FileMicrophone, NoMicrophone};
pub use mock::{MockAudioOutput, MockMicrophone};
pub use playback::{PlaybackAdapter, PlaybackEnd};

// =============================================================================
// Traits
// =============================================================================

/// A microphone that can be acquired for one recording at a time.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the device and start recording.
    ///
    /// A denied or missing permission must be reported as
    /// `KokoroError::PermissionDenied`.
    async fn open(&self) -> Result<Box<dyn MicrophoneStream>, KokoroError>;
}

/// An open recording stream.
#[async_trait]
pub trait MicrophoneStream: Send {
    /// Container type of the chunks, e.g. `audio/webm`.
    fn mime_type(&self) -> &str;

    /// Next encoded chunk, or `None` once the device has no more data.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, KokoroError>>;

    /// Stop recording and release the device.
    fn release(&mut self);
}

/// Staged audio awaiting or undergoing playback.
///
/// Must be handed back to [`AudioOutput::release`] once playback ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHandle {
    pub id: Uuid,
    pub len: usize,
    /// Backing file, for outputs that stage audio on disk.
    pub path: Option<PathBuf>,
}

/// The single audio output element.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Stage encoded audio for playback.
    async fn load(&self, audio: Vec<u8>) -> Result<BufferHandle, KokoroError>;

    /// Play staged audio, resolving when it ends naturally.
    async fn play(&self, handle: &BufferHandle) -> Result<(), KokoroError>;

    /// Halt whatever is currently playing.
    fn stop(&self);

    /// Free a staged buffer.
    fn release(&self, handle: BufferHandle);
}

//! Mock audio devices for testing without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use kokoro_core::error::KokoroError;

use crate::{AudioOutput, BufferHandle, MicrophoneSource, MicrophoneStream};

// =============================================================================
// MockMicrophone
// =============================================================================

#[derive(Debug, Default)]
struct MicCounters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Scripted microphone.
///
/// Clones share their open/release counters, so a test can keep one clone
/// while the adapter owns another.
#[derive(Debug, Clone)]
pub struct MockMicrophone {
    chunks: Vec<Vec<u8>>,
    interval: Duration,
    repeat: bool,
    denied: bool,
    fail_after: Option<usize>,
    counters: Arc<MicCounters>,
}

impl MockMicrophone {
    /// Yields the given chunks immediately, then reports end of data.
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            interval: Duration::ZERO,
            repeat: false,
            denied: false,
            fail_after: None,
            counters: Arc::default(),
        }
    }

    /// Yields `chunk` every `interval` until the capture is ended externally.
    pub fn streaming(chunk: Vec<u8>, interval: Duration) -> Self {
        Self {
            interval,
            repeat: true,
            ..Self::with_chunks(vec![chunk])
        }
    }

    /// Refuses to open, as if microphone permission was denied.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::with_chunks(vec![])
        }
    }

    /// Report a device error after `n` chunks have been yielded.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MicrophoneSource for MockMicrophone {
    async fn open(&self) -> Result<Box<dyn MicrophoneStream>, KokoroError> {
        if self.denied {
            return Err(KokoroError::PermissionDenied(
                "mock microphone permission denied".to_string(),
            ));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockMicrophoneStream {
            pending: self.chunks.iter().cloned().collect(),
            template: self.chunks.last().cloned(),
            interval: self.interval,
            repeat: self.repeat,
            fail_after: self.fail_after,
            yielded: 0,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MockMicrophoneStream {
    pending: VecDeque<Vec<u8>>,
    template: Option<Vec<u8>>,
    interval: Duration,
    repeat: bool,
    fail_after: Option<usize>,
    yielded: usize,
    counters: Arc<MicCounters>,
}

#[async_trait]
impl MicrophoneStream for MockMicrophoneStream {
    fn mime_type(&self) -> &str {
        "audio/webm"
    }

    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, KokoroError>> {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        if self.fail_after == Some(self.yielded) {
            return Some(Err(KokoroError::Audio("mock device unplugged".to_string())));
        }
        let chunk = match self.pending.pop_front() {
            Some(chunk) => chunk,
            None if self.repeat => self.template.clone()?,
            None => return None,
        };
        self.yielded += 1;
        Some(Ok(chunk))
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// MockAudioOutput
// =============================================================================

#[derive(Debug, Default)]
struct OutputState {
    played: Mutex<Vec<usize>>,
    loaded: AtomicUsize,
    released: AtomicUsize,
    stops: AtomicUsize,
}

/// Scripted audio output.
///
/// Playback "lasts" `duration` (use a paused tokio clock in tests) and either
/// ends naturally or fails with a decode error.
#[derive(Debug, Clone)]
pub struct MockAudioOutput {
    duration: Duration,
    fail_playback: bool,
    fail_load: bool,
    state: Arc<OutputState>,
}

impl Default for MockAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioOutput {
    /// Output whose playback ends immediately.
    pub fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            fail_playback: false,
            fail_load: false,
            state: Arc::default(),
        }
    }

    /// Output whose playback takes `duration`.
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::new()
        }
    }

    /// Output whose playback fails as if the audio could not be decoded.
    pub fn failing() -> Self {
        Self {
            fail_playback: true,
            ..Self::new()
        }
    }

    /// Output that rejects audio before playback starts.
    pub fn rejecting() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    /// Byte lengths of every buffer whose playback started.
    pub fn played(&self) -> Vec<usize> {
        self.state
            .played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn load_count(&self) -> usize {
        self.state.loaded.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutput for MockAudioOutput {
    async fn load(&self, audio: Vec<u8>) -> Result<BufferHandle, KokoroError> {
        if self.fail_load {
            return Err(KokoroError::Playback("mock output rejected audio".to_string()));
        }
        self.state.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(BufferHandle {
            id: Uuid::new_v4(),
            len: audio.len(),
            path: None,
        })
    }

    async fn play(&self, handle: &BufferHandle) -> Result<(), KokoroError> {
        self.state
            .played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.len);
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        if self.fail_playback {
            return Err(KokoroError::Playback("mock decode error".to_string()));
        }
        Ok(())
    }

    fn stop(&self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _handle: BufferHandle) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

//! Single-slot playback of synthesized replies.
//!
//! At most one playback is active. Starting a new one interrupts the previous
//! playback first, and every staged buffer is released once its playback
//! ends, fails, is interrupted, or is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use kokoro_core::error::KokoroError;

use crate::{AudioOutput, BufferHandle};

/// How a playback that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// The audio played to its end.
    Finished,
    /// A newer playback or an explicit stop cut it short.
    Interrupted,
}

struct ActivePlayback {
    id: u64,
    cancel: oneshot::Sender<()>,
}

/// Owns the audio output and enforces at-most-one concurrent playback.
pub struct PlaybackAdapter {
    output: Arc<dyn AudioOutput>,
    active: Mutex<Option<ActivePlayback>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PlaybackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackAdapter")
            .field("playing", &self.is_playing())
            .finish()
    }
}

impl PlaybackAdapter {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Play encoded audio, replacing any playback in progress.
    ///
    /// Resolves when the audio ends or is interrupted; fails on load or
    /// decode/playback errors.
    pub async fn play(&self, audio: Vec<u8>) -> Result<PlaybackEnd, KokoroError> {
        self.play_if(audio, || true).await
    }

    /// Like [`play`](Self::play), but only if `allowed` holds when the slot
    /// is taken; otherwise resolves `Interrupted` without loading anything.
    ///
    /// `allowed` is checked under the slot lock, so a [`stop`](Self::stop)
    /// issued after the condition turns false always finds this playback.
    pub async fn play_if<F>(&self, audio: Vec<u8>, allowed: F) -> Result<PlaybackEnd, KokoroError>
    where
        F: Fn() -> bool,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let previous = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if !allowed() {
                tracing::debug!(playback = id, "Playback skipped");
                return Ok(PlaybackEnd::Interrupted);
            }
            active.replace(ActivePlayback {
                id,
                cancel: cancel_tx,
            })
        };
        if let Some(previous) = previous {
            tracing::debug!(previous = previous.id, next = id, "Replacing active playback");
            let _ = previous.cancel.send(());
            self.output.stop();
        }
        let _slot = ActiveGuard { adapter: self, id };

        let bytes = audio.len();
        let handle = BufferGuard {
            output: Arc::clone(&self.output),
            handle: Some(self.output.load(audio).await?),
        };
        tracing::debug!(playback = id, bytes, "Playback started");

        let result = tokio::select! {
            played = self.output.play(handle.get()) => played.map(|()| PlaybackEnd::Finished),
            _ = cancel_rx => Ok(PlaybackEnd::Interrupted),
        };

        match &result {
            Ok(end) => tracing::debug!(playback = id, end = ?end, "Playback ended"),
            Err(e) => tracing::warn!(playback = id, error = %e, "Playback failed"),
        }
        result
    }

    /// Interrupt the active playback, if any.
    ///
    /// Returns `false` when nothing was playing.
    pub fn stop(&self) -> bool {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match active {
            Some(active) => {
                let _ = active.cancel.send(());
                self.output.stop();
                tracing::debug!(playback = active.id, "Playback stopped");
                true
            }
            None => false,
        }
    }
}

/// Clears the active slot if it still belongs to this playback.
struct ActiveGuard<'a> {
    adapter: &'a PlaybackAdapter,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self
            .adapter
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.id == self.id) {
            *active = None;
        }
    }
}

/// Hands a staged buffer back to the output when dropped.
struct BufferGuard {
    output: Arc<dyn AudioOutput>,
    handle: Option<BufferHandle>,
}

impl BufferGuard {
    fn get(&self) -> &BufferHandle {
        // Populated at construction and only taken in drop.
        self.handle.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.output.release(handle);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Bounded-duration utterance capture.
//!
//! A capture ends on the earliest of: an explicit [`CaptureAdapter::stop`],
//! the duration ceiling, or the device running out of data. The microphone
//! stream is released on every exit path, including errors and a dropped
//! capture future.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use kokoro_core::error::KokoroError;
use kokoro_core::types::AudioClip;

use crate::{MicrophoneSource, MicrophoneStream};

/// Why a capture stopped accumulating chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureEnd {
    Stopped,
    Ceiling,
    Exhausted,
}

/// Records one utterance at a time from a [`MicrophoneSource`].
pub struct CaptureAdapter {
    source: Arc<dyn MicrophoneSource>,
    active: AtomicBool,
    stop_slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("active", &self.is_active())
            .finish()
    }
}

impl CaptureAdapter {
    pub fn new(source: Arc<dyn MicrophoneSource>) -> Self {
        Self {
            source,
            active: AtomicBool::new(false),
            stop_slot: Mutex::new(None),
        }
    }

    /// Whether a capture is in progress.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Record until stopped, the ceiling elapses, or the device ends.
    ///
    /// Fails with `KokoroError::Audio` if another capture is active, and
    /// propagates `KokoroError::PermissionDenied` from the source.
    pub async fn capture(&self, max_duration: Duration) -> Result<AudioClip, KokoroError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(KokoroError::Audio(
                "Audio capture is already active".to_string(),
            ));
        }
        let _slot = SlotGuard(self);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);

        let started = Instant::now();
        let mut stream = StreamGuard::new(self.source.open().await?);
        let mime_type = stream.inner.mime_type().to_string();
        tracing::info!(max_ms = max_duration.as_millis() as u64, "Audio capture started");

        let deadline = tokio::time::sleep(max_duration);
        tokio::pin!(deadline);

        let mut bytes = Vec::new();
        let mut chunk_count = 0usize;
        let end = loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break CaptureEnd::Stopped,
                _ = &mut deadline => break CaptureEnd::Ceiling,
                chunk = stream.inner.next_chunk() => match chunk {
                    Some(Ok(data)) => {
                        chunk_count += 1;
                        bytes.extend_from_slice(&data);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, chunks = chunk_count, "Audio capture failed");
                        return Err(e);
                    }
                    None => break CaptureEnd::Exhausted,
                },
            }
        };
        stream.release();

        let duration = started.elapsed();
        tracing::info!(
            reason = ?end,
            chunks = chunk_count,
            bytes = bytes.len(),
            elapsed_ms = duration.as_millis() as u64,
            "Audio capture finished"
        );

        Ok(AudioClip {
            bytes,
            mime_type,
            chunk_count,
            duration,
        })
    }

    /// End the active capture early.
    ///
    /// Returns `false` when no capture is running or a stop is already pending.
    pub fn stop(&self) -> bool {
        let sender = self
            .stop_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                tracing::debug!("Audio capture stop requested");
                true
            }
            None => false,
        }
    }
}

/// Frees the capture slot when a capture ends, however it ends.
struct SlotGuard<'a>(&'a CaptureAdapter);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0
            .stop_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.0.active.store(false, Ordering::Release);
    }
}

/// Releases the microphone exactly once.
struct StreamGuard {
    inner: Box<dyn MicrophoneStream>,
    released: bool,
}

impl StreamGuard {
    fn new(inner: Box<dyn MicrophoneStream>) -> Self {
        Self {
            inner,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================

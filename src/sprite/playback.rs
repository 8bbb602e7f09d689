use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::model::{Sequence, Step};
use super::{Sprite, SpriteId, SpriteInner};
use crate::error::{EngineError, Result};

/// A running sequence: its thread plus the token used to cancel it.
pub(super) struct Playback {
    name: String,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    wake: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// Clears `active` however the playback thread exits.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Playback {
    pub(super) fn spawn(sprite: Weak<SpriteInner>, id: SpriteId, name: &str, sequence: Sequence) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(true));
        let (wake, wake_rx) = crossbeam_channel::bounded(1);

        let thread_stop = Arc::clone(&stop);
        let guard = ActiveGuard(Arc::clone(&active));
        let handle = thread::Builder::new()
            .name(format!("sprite-{}-{name}", id.0))
            .spawn(move || {
                let _guard = guard;
                play(&sprite, &sequence, &thread_stop, &wake_rx);
            })
            .map_err(EngineError::Spawn)?;

        Ok(Self { name: name.to_string(), stop, active, wake, handle: Some(handle) })
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask the thread to exit at its next instruction boundary, cutting any
    /// pending delay short.
    pub(super) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
    }

    /// Wait for the thread to end. Does nothing when called from the playback
    /// thread itself.
    pub(super) fn join(mut self) {
        let Some(handle) = self.handle.take() else { return };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("sequence \"{}\" panicked", self.name);
        }
    }
}

fn play(sprite: &Weak<SpriteInner>, sequence: &Sequence, stop: &AtomicBool, wake: &Receiver<()>) {
    let steps = sequence.steps();
    let len = steps.len();
    if len == 0 {
        return;
    }
    let mut index = 0;

    while (sequence.looping() || index < len) && !stop.load(Ordering::Acquire) {
        if index >= len {
            index = 0;
        }
        match &steps[index] {
            Step::Wait(ms) => {
                let Some(inner) = sprite.upgrade() else { break };
                let factor = Sprite { inner }.time_factor();
                // Tiny factors saturate; a stop request still cuts the wait short.
                let delay = Duration::try_from_secs_f64(*ms as f64 / 1000.0 / f64::from(factor))
                    .unwrap_or(Duration::MAX);
                match wake.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Woken by a stop request, or the sprite is gone.
                    _ => break,
                }
            }
            Step::Show { image, displacement } => {
                let Some(inner) = sprite.upgrade() else { break };
                if let Err(e) = (Sprite { inner }).apply_frame(image, *displacement) {
                    log::warn!("sequence step \"{image}\" failed: {e}");
                    if matches!(e, EngineError::QueueClosed(_)) {
                        break;
                    }
                }
            }
        }
        index += 1;
    }
}

//! Controlled media element
//!
//! The engine reads position, pause state and playback rate from the element,
//! writes position (seek) and playback rate, and observes its signals.

pub mod simulated;

use std::ops::ControlFlow;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use skipcut_common::MediaTime;

pub use simulated::SimulatedElement;

/// Signals emitted by a media element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementEvent {
    /// Playback position advanced
    TimeUpdate { position: MediaTime },
    /// A seek began (may fire again before the matching `Seeked`)
    Seeking,
    /// A seek completed
    Seeked,
    /// Playback rate changed
    RateChange { rate: f64 },
    Play,
    Pause,
}

/// Playback element controlled by the engine
///
/// Implementations must be cheap to call; the engine calls these while
/// holding its own state lock and never awaits on them.
pub trait MediaElement: Send + Sync {
    /// Current position in media time
    fn current_time(&self) -> MediaTime;

    /// Seek to `position`
    fn set_current_time(&self, position: MediaTime);

    fn paused(&self) -> bool;

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    /// Subscribe to element signals
    fn subscribe(&self) -> broadcast::Receiver<ElementEvent>;
}

/// Handle to a running signal listener
///
/// Cancelling (or dropping) the handle stops the listener. Cancelling twice
/// is a no-op.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop listening; returns false if already cancelled
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn a listener task feeding element signals to `on_event`
///
/// The listener ends when `on_event` returns `ControlFlow::Break`, when the
/// element's channel closes, or when the returned handle is cancelled.
pub fn listen<F>(mut rx: broadcast::Receiver<ElementEvent>, mut on_event: F) -> Subscription
where
    F: FnMut(ElementEvent) -> ControlFlow<()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if on_event(event).is_break() {
                        trace!("Element listener stopped by handler");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Element listener lagged, {} signals dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    trace!("Element signal channel closed");
                    break;
                }
            }
        }
    });

    Subscription {
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_listener_receives_events() {
        let (tx, rx) = broadcast::channel(16);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let _subscription = listen(rx, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tx.send(ElementEvent::Seeking).unwrap();
        tx.send(ElementEvent::Seeked).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (_tx, rx) = broadcast::channel::<ElementEvent>(16);
        let mut subscription = listen(rx, |_| ControlFlow::Continue(()));

        assert!(subscription.cancel());
        assert!(!subscription.cancel());
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn test_break_stops_listener() {
        let (tx, rx) = broadcast::channel(16);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let subscription = listen(rx, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Break(())
        });

        tx.send(ElementEvent::Play).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let _ = tx.send(ElementEvent::Pause);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }
}

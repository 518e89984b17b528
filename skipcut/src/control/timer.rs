//! Single-slot one-shot timers
//!
//! Each timer purpose (pending skip decision, rate restoration, detector
//! rebuild) owns one `TimerSlot`. Arming a slot always cancels whatever was
//! armed before: last write wins, never queued.
//!
//! **Design:** The callback runs on a spawned tokio task after the delay.
//! Because a superseded task may already be past its sleep when it gets
//! aborted, every arm hands out a [`TimerToken`] and the callback must
//! [`TimerSlot::claim`] it under the owner's lock before acting.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies one arming of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

/// One live timer at most
#[derive(Debug)]
pub struct TimerSlot {
    purpose: &'static str,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new(purpose: &'static str) -> Self {
        Self {
            purpose,
            generation: 0,
            handle: None,
        }
    }

    /// Cancel any armed timer and arm a new one
    ///
    /// `on_fire` receives the token of this arming.
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> TimerToken
    where
        F: FnOnce(TimerToken) + Send + 'static,
    {
        self.cancel();

        let token = TimerToken(self.generation);
        trace!(
            "Arming {} timer #{} for {:.3}s",
            self.purpose,
            token.0,
            delay.as_secs_f64()
        );
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(token);
        }));
        token
    }

    /// Cancel the armed timer; returns false if nothing was armed
    pub fn cancel(&mut self) -> bool {
        // Invalidate the token even if the task already finished sleeping
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                trace!("Cancelled {} timer", self.purpose);
                true
            }
            None => false,
        }
    }

    /// Accept a firing; false when `token` was superseded or cancelled
    ///
    /// Disarms the slot on success so the firing callback may re-arm it.
    pub fn claim(&mut self, token: TimerToken) -> bool {
        if token.0 != self.generation || self.handle.is_none() {
            return false;
        }
        // The task is finishing on its own; do not abort it
        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let slot = Arc::new(Mutex::new(TimerSlot::new("test")));
        let fired = Arc::new(Mutex::new(false));

        let slot_ref = Arc::clone(&slot);
        let fired_ref = Arc::clone(&fired);
        slot.lock().unwrap().arm(Duration::from_secs(2), move |token| {
            if slot_ref.lock().unwrap().claim(token) {
                *fired_ref.lock().unwrap() = true;
            }
        });

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(!*fired.lock().unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(*fired.lock().unwrap());
        assert!(!slot.lock().unwrap().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous() {
        let slot = Arc::new(Mutex::new(TimerSlot::new("test")));
        let fired = Arc::new(Mutex::new(Vec::new()));

        for (label, secs) in [("first", 1), ("second", 3)] {
            let slot_ref = Arc::clone(&slot);
            let fired_ref = Arc::clone(&fired);
            slot.lock().unwrap().arm(Duration::from_secs(secs), move |token| {
                if slot_ref.lock().unwrap().claim(token) {
                    fired_ref.lock().unwrap().push(label);
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn test_stale_token_rejected() {
        let mut slot = TimerSlot::new("test");
        let first = slot.arm(Duration::from_secs(60), |_| {});
        let second = slot.arm(Duration::from_secs(60), |_| {});

        assert!(!slot.claim(first));
        assert!(slot.claim(second));
        assert!(!slot.claim(second));
    }

    #[tokio::test]
    async fn test_cancel_reports_whether_armed() {
        let mut slot = TimerSlot::new("test");
        assert!(!slot.cancel());

        let token = slot.arm(Duration::from_secs(60), |_| {});
        assert!(slot.is_armed());
        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert!(!slot.claim(token));
    }
}

//! Cancellable scheduled work
//!
//! A `TimerSlot` holds at most one outstanding piece of scheduled work.
//! Arming the slot hands out a `TimerToken`; the scheduled task must
//! `claim` its token (under the same lock that guards the slot) before it
//! acts. Cancelling or re-arming bumps the generation, so a task that has
//! already woken up but not yet claimed can never act on a stale token.
//! The task handle is aborted as well, so a cancelled timer normally never
//! wakes at all.
//!
//! Typical use, with the slot stored inside component state behind a mutex:
//!
//! ```ignore
//! let mut st = state.lock();
//! let token = st.slot.arm();
//! let handle = tokio::spawn(async move {
//!     tokio::time::sleep(delay).await;
//!     if !shared.lock().slot.claim(token) {
//!         return;
//!     }
//!     act().await;
//! });
//! st.slot.attach(token, handle);
//! ```

use tokio::task::JoinHandle;

/// Identifies one arming of a `TimerSlot`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    generation: u64,
}

impl TimerToken {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// At-most-one outstanding scheduled action
#[derive(Debug, Default)]
pub struct TimerSlot {
    generation: u64,
    armed: Option<u64>,
    task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is an action currently scheduled?
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Current generation (increases on every arm and cancel)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arm the slot, superseding anything pending
    pub fn arm(&mut self) -> TimerToken {
        self.cancel();
        self.armed = Some(self.generation);
        TimerToken {
            generation: self.generation,
        }
    }

    /// Store the task backing `token` so cancellation can abort it.
    /// A handle for a token that is no longer current is aborted at once.
    pub fn attach(&mut self, token: TimerToken, handle: JoinHandle<()>) {
        if self.armed == Some(token.generation) {
            if let Some(old) = self.task.replace(handle) {
                old.abort();
            }
        } else {
            handle.abort();
        }
    }

    /// Does `token` still own the slot?
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.armed == Some(token.generation)
    }

    /// Take ownership of the firing. Returns false when the token has been
    /// cancelled or superseded; the caller must then do nothing.
    pub fn claim(&mut self, token: TimerToken) -> bool {
        if self.armed != Some(token.generation) {
            return false;
        }
        self.armed = None;
        // The claiming task is the one behind this handle; dropping the
        // handle detaches it without aborting.
        self.task = None;
        true
    }

    /// Cancel whatever is pending. Returns true if something was armed.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.armed.take().is_some();
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        was_armed
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    fn schedule(slot: &Arc<Mutex<TimerSlot>>, hits: &Arc<AtomicUsize>, delay: Duration) {
        let mut guard = slot.lock();
        let token = guard.arm();
        let shared = Arc::clone(slot);
        let hits = Arc::clone(hits);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !shared.lock().claim(token) {
                return;
            }
            hits.fetch_add(1, Ordering::SeqCst);
        });
        guard.attach(token, handle);
    }

    #[test]
    fn test_claim_only_once() {
        let mut slot = TimerSlot::new();
        let token = slot.arm();
        assert!(slot.is_armed());
        assert!(slot.claim(token));
        assert!(!slot.claim(token));
        assert!(!slot.is_armed());
    }

    #[test]
    fn test_rearm_invalidates_previous_token() {
        let mut slot = TimerSlot::new();
        let first = slot.arm();
        let second = slot.arm();
        assert!(!slot.is_current(first));
        assert!(!slot.claim(first));
        assert!(slot.claim(second));
    }

    #[test]
    fn test_cancel_reports_armed() {
        let mut slot = TimerSlot::new();
        assert!(!slot.cancel());
        let token = slot.arm();
        assert!(slot.cancel());
        assert!(!slot.claim(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let slot = Arc::new(Mutex::new(TimerSlot::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        schedule(&slot, &hits, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!slot.lock().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let slot = Arc::new(Mutex::new(TimerSlot::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        schedule(&slot, &hits, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(slot.lock().cancel());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_fires_once() {
        let slot = Arc::new(Mutex::new(TimerSlot::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        schedule(&slot, &hits, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        schedule(&slot, &hits, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

//! Throttle gate
//!
//! Bounds a repeatedly-firing signal to one execution per window. The first
//! call in a window runs immediately; calls suppressed during the window
//! collapse into a single trailing execution once it elapses, carrying the
//! arguments of the most recent call.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

type Action<A> = Arc<dyn Fn(A) + Send + Sync>;

struct GateState<A> {
    last_admitted: Option<Instant>,
    pending: Option<JoinHandle<()>>,
    /// Arguments the pending call will run with
    pending_args: Option<A>,
    /// Bumped whenever a pending call is scheduled or superseded
    generation: u64,
}

/// Factory for throttled actions
pub struct Throttle;

impl Throttle {
    /// Wrap `action` so it runs at most once per `window`, plus one trailing run
    pub fn wrap<A, F>(action: F, window: Duration) -> Throttled<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        Throttled {
            action: Arc::new(action),
            window,
            state: Arc::new(Mutex::new(GateState {
                last_admitted: None,
                pending: None,
                pending_args: None,
                generation: 0,
            })),
        }
    }
}

/// A throttled action. Each wrapper owns its own gate state.
///
/// Deferred runs are spawned on the current tokio runtime, so `call` must be
/// made from within one.
pub struct Throttled<A> {
    action: Action<A>,
    window: Duration,
    state: Arc<Mutex<GateState<A>>>,
}

impl<A: Send + 'static> Throttled<A> {
    pub fn call(&self, args: A) {
        self.call_at(args, Instant::now());
    }

    fn call_at(&self, args: A, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = state.last_admitted.map(|last| now.saturating_duration_since(last));
        match elapsed {
            Some(elapsed) if elapsed < self.window => {
                state.pending_args = Some(args);
                if state.pending.is_none() {
                    state.generation += 1;
                    let delay = self.window - elapsed;
                    state.pending = Some(self.schedule(delay, state.generation));
                }
            }
            _ => {
                if let Some(pending) = state.pending.take() {
                    pending.abort();
                    state.generation += 1;
                }
                state.pending_args = None;
                state.last_admitted = Some(now);
                drop(state);
                (self.action)(args);
            }
        }
    }

    /// Whether a trailing call is currently scheduled
    #[cfg(test)]
    fn has_pending(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .is_some()
    }

    fn schedule(&self, delay: Duration, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let action = Arc::clone(&self.action);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let args = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                // Superseded by an admitted call while waking up
                if state.generation != generation {
                    return;
                }
                state.last_admitted = Some(Instant::now());
                state.pending = None;
                state.pending_args.take()
            };
            if let Some(args) = args {
                action(args);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(()) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_: ()| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_leading_and_trailing_once() {
        let (count, action) = counter();
        let gate = Throttle::wrap(action, Duration::from_millis(2000));

        for _ in 0..10 {
            gate.call(());
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(gate.has_pending());

        // Trailing run fires once the window (measured from the first call) ends
        tokio::time::sleep(Duration::from_millis(1850)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!gate.has_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_call_has_no_trailing_run() {
        let (count, action) = counter();
        let gate = Throttle::wrap(action, Duration::from_millis(500));

        gate.call(());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_window_are_admitted_immediately() {
        let (count, action) = counter();
        let gate = Throttle::wrap(action, Duration::from_millis(100));

        gate.call(());
        tokio::time::advance(Duration::from_millis(100)).await;
        gate.call(());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_call_uses_latest_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let gate = Throttle::wrap(
            move |value: u32| sink.lock().unwrap().push(value),
            Duration::from_millis(1000),
        );

        gate.call(1);
        gate.call(2);
        gate.call(3);
        gate.call(4);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_run_starts_new_window() {
        let (count, action) = counter();
        let gate = Throttle::wrap(action, Duration::from_millis(1000));

        gate.call(());
        gate.call(());
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Within the window opened by the trailing run, so deferred again
        gate.call(());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_wrappers() {
        let (count, action) = counter();
        let action = Arc::new(action);
        let a = {
            let action = action.clone();
            Throttle::wrap(move |x: ()| action(x), Duration::from_millis(1000))
        };
        let b = Throttle::wrap(move |x: ()| action(x), Duration::from_millis(1000));

        a.call(());
        b.call(());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: u32| sink.lock().unwrap().push(value))
    }

    #[tokio::test(start_paused = true)]
    async fn test_admitted_call_cancels_pending_run() {
        let (seen, action) = recorder();
        let window = Duration::from_millis(1000);
        let gate = Throttle::wrap(action, window);

        let start = Instant::now();
        gate.call(1);
        gate.call(2);
        assert!(gate.has_pending());

        // Window elapsed before the deferred run was polled
        gate.call_at(3, start + window);
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
        assert!(!gate.has_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_does_not_fire() {
        let (seen, action) = recorder();
        let gate = Throttle::wrap(action, Duration::from_millis(1000));

        gate.call(1);
        gate.call(2);
        {
            // Same bookkeeping as an admitted call racing a timer that already woke
            let mut state = gate.state.lock().unwrap();
            state.pending.take();
            state.generation += 1;
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}

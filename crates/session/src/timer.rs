use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelFlag {
    fn cancel(&self) {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        self.wake.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep until `deadline` or cancellation. Returns `true` if cancelled.
    fn sleep_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match self.wake.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

/// A timer running on its own thread, stopped by [`TimerHandle::cancel`] or drop.
///
/// Cancelling never joins the thread, so a callback may cancel its own handle.
/// A callback already running when `cancel` is called finishes normally.
#[derive(Debug)]
pub struct TimerHandle {
    flag: Arc<CancelFlag>,
}

impl TimerHandle {
    /// Run `task` once after `delay` unless cancelled first.
    pub fn once<F>(name: &str, delay: Duration, task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let flag = Arc::new(CancelFlag::default());
        let thread_flag = Arc::clone(&flag);
        spawn_named(name, move || {
            if !thread_flag.sleep_until(Instant::now() + delay) {
                task();
            }
        });
        Self { flag }
    }

    /// Run `tick` every `period` (first run after one period) until it
    /// returns `ControlFlow::Break` or the handle is cancelled.
    ///
    /// Ticks are scheduled at a fixed rate: a slow tick does not push the
    /// following ones back.
    pub fn repeating<F>(name: &str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let flag = Arc::new(CancelFlag::default());
        let thread_flag = Arc::clone(&flag);
        spawn_named(name, move || {
            let mut next = Instant::now() + period;
            loop {
                if thread_flag.sleep_until(next) {
                    return;
                }
                if tick().is_break() {
                    return;
                }
                next += period;
            }
        });
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.flag.cancel();
    }
}

fn spawn_named<F>(name: &str, body: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(body) {
        tracing::error!(timer = name, error = %e, "Failed to spawn timer thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn once_fires_after_delay() {
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        let _timer = TimerHandle::once("test-once", Duration::from_millis(20), move || {
            tx.send(Instant::now()).ok();
        });
        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired - started >= Duration::from_millis(20));
    }

    #[test]
    fn cancelled_once_never_fires() {
        let (tx, rx) = mpsc::channel::<()>();
        let timer = TimerHandle::once("test-cancel", Duration::from_millis(50), move || {
            tx.send(()).ok();
        });
        timer.cancel();
        assert!(timer.is_cancelled());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn dropping_handle_cancels() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(TimerHandle::once("test-drop", Duration::from_millis(50), move || {
            tx.send(()).ok();
        }));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn repeating_stops_on_break() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<()>();
        let ticks = Arc::clone(&count);
        let _timer = TimerHandle::repeating("test-repeat", Duration::from_millis(5), move || {
            if ticks.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                tx.send(()).ok();
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn repeating_stops_on_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let timer = TimerHandle::repeating("test-repeat-cancel", Duration::from_millis(5), move || {
            ticks.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        thread::sleep(Duration::from_millis(40));
        timer.cancel();
        thread::sleep(Duration::from_millis(20));
        let after_cancel = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }
}

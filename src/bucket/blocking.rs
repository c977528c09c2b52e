//! Parking strategies for blocking consumption.
//!
//! A blocking consume reserves its tokens first, then parks the calling
//! thread for the reported wait. Strategies are injected so callers can
//! substitute spin loops or cooperative yields for real parking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Raised by an interruptible park that was woken by an
/// [`InterruptHandle`] before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitInterrupted;

/// How to suspend the current thread for a bounded duration.
pub trait BlockingStrategy: Send + Sync {
    /// Park the current thread for `nanos`. Interruptible: may return
    /// early with [`WaitInterrupted`].
    fn park(&self, nanos: u64) -> Result<(), WaitInterrupted>;

    /// Park ignoring interrupts. An interrupt that arrives while parked
    /// stays pending for the caller to observe afterwards.
    fn park_uninterruptibly(&self, nanos: u64);
}

/// Default strategy: loops on [`thread::park_timeout`] against a captured
/// deadline, so spurious wakeups extend the park instead of ending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadParking;

impl BlockingStrategy for ThreadParking {
    fn park(&self, nanos: u64) -> Result<(), WaitInterrupted> {
        park_until(deadline_after(nanos), || false);
        Ok(())
    }

    fn park_uninterruptibly(&self, nanos: u64) {
        park_until(deadline_after(nanos), || false);
    }
}

/// Parking that can be cut short from another thread through its paired
/// [`InterruptHandle`].
///
/// One strategy instance belongs to one consuming thread at a time; the
/// handle may be cloned and shared freely.
#[derive(Debug, Clone)]
pub struct InterruptibleParking {
    shared: Arc<ParkShared>,
}

/// The interrupting side of an [`InterruptibleParking`] pair.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    shared: Arc<ParkShared>,
}

#[derive(Debug)]
struct ParkShared {
    interrupted: AtomicBool,
    parked: Mutex<Option<Thread>>,
}

impl InterruptibleParking {
    pub fn new() -> (Self, InterruptHandle) {
        let shared = Arc::new(ParkShared {
            interrupted: AtomicBool::new(false),
            parked: Mutex::new(None),
        });
        (
            Self {
                shared: shared.clone(),
            },
            InterruptHandle { shared },
        )
    }
}

impl InterruptHandle {
    /// Interrupt the consumer: sets the pending flag and wakes it if it is
    /// currently parked.
    pub fn interrupt(&self) {
        self.shared.interrupted.store(true, Ordering::SeqCst);
        if let Some(thread) = self.shared.parked.lock().clone() {
            thread.unpark();
        }
    }

    /// Whether an interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.shared.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the pending flag, returning its previous value.
    pub fn take_interrupted(&self) -> bool {
        self.shared.interrupted.swap(false, Ordering::SeqCst)
    }
}

impl BlockingStrategy for InterruptibleParking {
    fn park(&self, nanos: u64) -> Result<(), WaitInterrupted> {
        let deadline = deadline_after(nanos);
        *self.shared.parked.lock() = Some(thread::current());
        // An interruptible park consumes the pending flag when it fires.
        let result = if park_until(deadline, || {
            self.shared.interrupted.swap(false, Ordering::SeqCst)
        }) {
            Err(WaitInterrupted)
        } else {
            Ok(())
        };
        *self.shared.parked.lock() = None;
        result
    }

    fn park_uninterruptibly(&self, nanos: u64) {
        let deadline = deadline_after(nanos);
        *self.shared.parked.lock() = Some(thread::current());
        // Interrupts are absorbed: the flag stays set for the caller.
        park_until(deadline, || false);
        *self.shared.parked.lock() = None;
    }
}

fn deadline_after(nanos: u64) -> Instant {
    Instant::now() + Duration::from_nanos(nanos)
}

/// Park until `deadline` or until `interrupted()` reports true. Returns
/// whether the park ended by interruption.
fn park_until(deadline: Instant, interrupted: impl Fn() -> bool) -> bool {
    loop {
        if interrupted() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::park_timeout(deadline - now);
    }
}

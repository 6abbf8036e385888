use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::error::{Error, Result};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

// one per batch, cloned into every session task; set at most once, never reset
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    // idempotent; returns true only for the call that flipped the flag
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `total`, in slices of `tick`, failing with
    /// [`Error::Cancelled`] at the first slice boundary after cancellation.
    ///
    /// Always sleeps at least one tick: a `total` that is not above `tick`
    /// is floored to it, and a zero `tick` falls back to [`DEFAULT_TICK`].
    pub async fn sleep(&self, total: Duration, tick: Duration) -> Result<()> {
        let tick = if tick.is_zero() { DEFAULT_TICK } else { tick };
        let total = total.max(tick);
        let mut slept = Duration::ZERO;
        while slept < total {
            let step = tick.min(total - slept);
            tokio::time::sleep(step).await;
            slept += step;
            self.check()?;
        }
        Ok(())
    }
}

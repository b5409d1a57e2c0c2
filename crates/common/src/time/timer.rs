//! Cancellable one-shot and recurring timers
//!
//! Every timer returns a [`TimerHandle`]. Cancelling the handle stops a timer
//! that has not fired yet; a callback that is already running is left to
//! finish. Dropping the handle does *not* cancel the timer, so owners store
//! the handle and cancel it explicitly (e.g. on logout or shutdown).

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A handle that can be used to cancel a timer
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run `task` once after `delay` unless cancelled first.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use taskdesk_common::time::timer::schedule;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = schedule(Duration::from_secs(5), async {
///         tracing::info!("fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = TimerHandle::new();
    let token = handle.token.clone();

    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = token.cancelled() => {}
            () = sleep(delay) => task.await,
        }
    });

    handle
}

/// Invoke `callback` every `period` (first call after one period) until
/// cancelled.
pub fn recurring<F>(period: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    let handle = TimerHandle::new();
    let token = handle.token.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => callback(),
            }
        }
    });

    handle
}

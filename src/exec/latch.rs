// src/exec/latch.rs

//! Single-fire events.
//!
//! A [`Latch`] fires at most once and then stays fired: every
//! [`LatchWaiter`], including ones created or cloned after the fact, observes
//! the fired value immediately. The watcher uses latches for two things:
//!
//! - shutdown/cancellation, threaded through every git command;
//! - process completion, one latch per supervised process generation.

use tokio::sync::watch;

/// Create a connected latch / waiter pair.
pub fn latch<T>() -> (Latch<T>, LatchWaiter<T>)
where
    T: Clone + Send + Sync,
{
    let (tx, rx) = watch::channel(None);
    (Latch { tx }, LatchWaiter { rx })
}

/// Firing side of a single-fire event.
#[derive(Debug)]
pub struct Latch<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Latch<T>
where
    T: Clone + Send + Sync,
{
    /// Fire the latch with `value`.
    ///
    /// Returns `false` if the latch had already fired; the first value wins.
    pub fn fire(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(value);
                true
            } else {
                false
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn waiter(&self) -> LatchWaiter<T> {
        LatchWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observing side of a single-fire event. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LatchWaiter<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T> LatchWaiter<T>
where
    T: Clone + Send + Sync,
{
    /// The fired value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    pub fn is_fired(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until the latch fires and return its value.
    ///
    /// If the firing side is dropped without ever firing, this never
    /// resolves.
    pub async fn fired(&mut self) -> T {
        if let Ok(slot) = self.rx.wait_for(Option::is_some).await {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
        }
        std::future::pending().await
    }
}

/// Shutdown / cancellation token passed to every git command.
pub type CancelToken = LatchWaiter<()>;

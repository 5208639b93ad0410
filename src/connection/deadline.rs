//! Movable read deadline
//!
//! The session moves the deadline forward on PINGREQ while the reader is
//! parked on a read, so the deadline lives in a watch channel: the session
//! holds the [`DeadlineSetter`] and the reader races every read against the
//! [`DeadlineWatch`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};

/// Create a linked setter/watch pair
///
/// `None` means no deadline.
pub fn read_deadline(initial: Option<Instant>) -> (DeadlineSetter, DeadlineWatch) {
    let (tx, rx) = watch::channel(initial);
    (DeadlineSetter { tx }, DeadlineWatch { rx })
}

/// Session side: moves the deadline
#[derive(Debug)]
pub struct DeadlineSetter {
    tx: watch::Sender<Option<Instant>>,
}

impl DeadlineSetter {
    /// Set the deadline to `now + by`
    pub fn extend(&self, by: Duration) {
        self.tx.send_replace(Some(Instant::now() + by));
    }

    pub fn current(&self) -> Option<Instant> {
        *self.tx.borrow()
    }
}

/// Reader side: bounds reads by the current deadline
#[derive(Debug)]
pub struct DeadlineWatch {
    rx: watch::Receiver<Option<Instant>>,
}

impl DeadlineWatch {
    /// Drive `fut` to completion unless the deadline passes first
    ///
    /// Returns `None` when the deadline expired. A deadline moved while `fut`
    /// is pending takes effect immediately; `fut` itself is not restarted.
    pub async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);

        loop {
            let deadline = *self.rx.borrow_and_update();

            let expired = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                output = &mut fut => return Some(output),
                _ = expired => return None,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // Setter gone, the deadline can no longer move
                        return match deadline {
                            Some(at) => timeout_at(at, &mut fut).await.ok(),
                            None => Some(fut.await),
                        };
                    }
                }
            }
        }
    }
}

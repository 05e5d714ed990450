//! One-shot phase signaling for stampede.
//!
//! The harness coordinates a handful of phase changes: the query benchmark
//! period expiring, the user pressing ctrl-c, workers being told to wind
//! down. Each phase is a one-time event with one `Broadcaster` and any
//! number of `Watcher` instances. Firing the signal consumes the
//! `Broadcaster`; a `Watcher` observes the event either by awaiting `recv`
//! or by polling `try_recv` at loop iteration boundaries. Dropping the
//! `Broadcaster` also fires the signal, so a holder that cannot fire it
//! deliberately must keep it alive.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

use tokio::sync::broadcast::{self, error};

/// Construct a connected `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    // The broadcast channel is used purely for its closed-channel
    // semantics: dropping the sender is observed by every receiver, even
    // receivers subscribed after the drop.
    let (sender, receiver) = broadcast::channel(1);

    let w = Watcher {
        receiver,
        signal_received: false,
    };

    let b = Broadcaster { sender };

    (w, b)
}

#[derive(Debug)]
/// Fires the one-time signal observed by `Watcher` instances.
pub struct Broadcaster {
    /// Dropping this sender is the signal.
    sender: broadcast::Sender<()>,
}

impl Broadcaster {
    /// Fire the signal. Every watcher, present and future, will observe
    /// it.
    pub fn signal(self) {
        drop(self.sender);
    }
}

/// Errors for [`Watcher::try_recv`].
#[derive(thiserror::Error, Debug, Clone, Copy)]
pub enum TryRecvError {
    /// The signal was already received by a previous call.
    #[error("signal has been received")]
    SignalReceived,
}

#[derive(Debug)]
/// Observes the one-time signal fired by a [`Broadcaster`].
pub struct Watcher {
    /// Set once the signal has been observed by this instance.
    signal_received: bool,
    /// Receiving half; channel closure is the signal.
    receiver: broadcast::Receiver<()>,
}

impl Watcher {
    /// Wait for the signal, consuming this watcher. Returns immediately if
    /// the signal was already received.
    ///
    /// # Panics
    ///
    /// Panics if the broadcast receiver reports lag, which cannot happen
    /// with a channel that only ever closes.
    pub async fn recv(mut self) {
        if self.signal_received {
            // Inside a `select!` an immediately-ready arm can starve the
            // others; yield once to be polite.
            tokio::task::yield_now().await;
            return;
        }

        match self.receiver.recv().await {
            Ok(()) | Err(error::RecvError::Closed) => {}
            Err(error::RecvError::Lagged(_)) => {
                panic!("signal channel lagged, impossible by construction");
            }
        }
    }

    /// Poll for the signal without blocking. `Ok(false)` while unfired,
    /// `Ok(true)` on first observation, error on every call after that.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::SignalReceived`] once the signal has been
    /// observed by this watcher.
    ///
    /// # Panics
    ///
    /// Panics if the broadcast receiver reports lag, which cannot happen
    /// with a channel that only ever closes.
    pub fn try_recv(&mut self) -> Result<bool, TryRecvError> {
        if self.signal_received {
            return Err(TryRecvError::SignalReceived);
        }

        match self.receiver.try_recv() {
            Ok(()) | Err(error::TryRecvError::Closed) => {
                self.signal_received = true;
                Ok(true)
            }
            Err(error::TryRecvError::Empty) => Ok(false),
            Err(error::TryRecvError::Lagged(_)) => {
                panic!("signal channel lagged, impossible by construction")
            }
        }
    }
}

impl Clone for Watcher {
    /// Clones observe the signal independently of the original.
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            signal_received: self.signal_received,
        }
    }
}

//! The single-threaded runloop binding.
//!
//! The interpreter runs on one owner thread. Work reaches it through two
//! queues: a local queue for messages posted from the owner thread itself
//! (observer dispatch posts its records here as self-referencing tasks),
//! and a remote queue whose cloneable [`RunLoopProxy`] is the only thing
//! other threads ever touch. Request completions and external wakeups are
//! marshalled through the proxy, so callback execution always lands on the
//! owner thread.

use crate::coroutine::CoroId;
use crate::request::RequestId;
use crossbeam_channel::{Receiver, Sender};
use hvml_variant::{Atom, Variant};
use std::time::{Duration, Instant};

/// A routed observer message: `(target coroutine, source, event, sub,
/// extra payload)`.
#[derive(Clone)]
pub struct MessageRecord {
    pub target: CoroId,
    pub source: Variant,
    pub event: Atom,
    pub sub: Option<String>,
    pub extra: Variant,
}

/// Messages that never leave the owner thread.
pub enum LocalMsg {
    Message(MessageRecord),
}

/// Messages that may be posted from any thread.
pub enum RemoteMsg {
    /// A request finished on another thread; the payload is plain JSON so
    /// it can cross threads (variants cannot).
    RequestDone {
        id: RequestId,
        result: std::result::Result<serde_json::Value, String>,
    },
    /// Make a parked coroutine ready.
    Wake(CoroId),
    Stop,
}

/// What one wait on the loop produced.
pub enum Polled {
    Local(LocalMsg),
    Remote(RemoteMsg),
    TimedOut,
    /// Both queues hung up (only happens at teardown).
    Closed,
}

pub struct RunLoop {
    local_tx: Sender<LocalMsg>,
    local_rx: Receiver<LocalMsg>,
    remote_tx: Sender<RemoteMsg>,
    remote_rx: Receiver<RemoteMsg>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        let (local_tx, local_rx) = crossbeam_channel::unbounded();
        let (remote_tx, remote_rx) = crossbeam_channel::unbounded();
        RunLoop {
            local_tx,
            local_rx,
            remote_tx,
            remote_rx,
        }
    }

    /// The cross-thread handle. Cheap to clone; safe to send anywhere.
    pub fn proxy(&self) -> RunLoopProxy {
        RunLoopProxy {
            tx: self.remote_tx.clone(),
        }
    }

    /// Post a message from the owner thread to be picked up by the next
    /// wait.
    pub fn post(&self, msg: LocalMsg) {
        // the receiver lives as long as self, so this cannot fail
        let _ = self.local_tx.send(msg);
    }

    /// Drain without blocking.
    pub fn try_next(&self) -> Polled {
        if let Ok(msg) = self.local_rx.try_recv() {
            return Polled::Local(msg);
        }
        if let Ok(msg) = self.remote_rx.try_recv() {
            return Polled::Remote(msg);
        }
        Polled::TimedOut
    }

    /// Block until something arrives or `deadline` passes. `None` blocks
    /// until the next message.
    pub fn wait(&self, deadline: Option<Instant>) -> Polled {
        loop {
            let timeout = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(remaining) => remaining,
                    None => return Polled::TimedOut,
                },
                // park "forever"; an hour keeps the select arm simple and
                // is indistinguishable from forever for a parked loop
                None => Duration::from_secs(3600),
            };

            crossbeam_channel::select! {
                recv(self.local_rx) -> msg => {
                    return match msg {
                        Ok(msg) => Polled::Local(msg),
                        Err(_) => Polled::Closed,
                    };
                }
                recv(self.remote_rx) -> msg => {
                    return match msg {
                        Ok(msg) => Polled::Remote(msg),
                        Err(_) => Polled::Closed,
                    };
                }
                default(timeout) => {
                    if deadline.is_some() {
                        return Polled::TimedOut;
                    }
                    // spurious hourly wakeup of a fully parked loop
                }
            }
        }
    }
}

/// The only runloop handle other threads hold.
#[derive(Clone)]
pub struct RunLoopProxy {
    tx: Sender<RemoteMsg>,
}

impl RunLoopProxy {
    /// Dispatch to the owner thread. Returns false if the loop is gone.
    pub fn dispatch(&self, msg: RemoteMsg) -> bool {
        self.tx.send(msg).is_ok()
    }
}

//! Human-readable session status.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, unbounded};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Starting,
    LoadingAccessory(String),
    Tracking(String),
    NoSubject,
    /// Detector or camera unavailable; accessories follow simulated motion.
    Simulated(String),
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Starting => f.write_str("starting"),
            Status::LoadingAccessory(name) => write!(f, "loading {name}"),
            Status::Tracking(name) => write!(f, "tracking {name}"),
            Status::NoSubject => f.write_str("no face or body detected"),
            Status::Simulated(reason) => write!(f, "simulated motion ({reason})"),
            Status::Stopped => f.write_str("stopped"),
        }
    }
}

/// Publishes status updates, suppressing repeats.
#[derive(Debug)]
pub struct StatusChannel {
    tx: Sender<Status>,
    last: Option<Status>,
}

impl StatusChannel {
    pub fn new(tx: Sender<Status>) -> Self {
        Self { tx, last: None }
    }

    pub fn unbounded() -> (Self, Receiver<Status>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    /// Returns true if the status changed and was sent.
    pub fn publish(&mut self, status: Status) -> bool {
        if self.last.as_ref() == Some(&status) {
            return false;
        }
        // Observers are optional; a closed channel is not an error.
        let _ = self.tx.send(status.clone());
        self.last = Some(status);
        true
    }

    pub fn current(&self) -> Option<&Status> {
        self.last.as_ref()
    }
}

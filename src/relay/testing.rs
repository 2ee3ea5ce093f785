//! Test doubles for relay unit tests.

use std::sync::Mutex;

use super::transport::Transport;
use crate::irc::Command;
use crate::Result;

/// Transport that records every command instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Command>>,
}

impl RecordingTransport {
    /// Commands sent so far.
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    /// Forget recorded commands.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, command: Command) -> Result<()> {
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}

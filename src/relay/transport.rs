//! Outbound side of a connection.

use crate::irc::Command;
use crate::Result;

/// Something that can queue commands for a network connection.
///
/// Sending never waits for I/O; an error means the connection is gone.
pub trait Transport: Send + Sync {
    fn send(&self, command: Command) -> Result<()>;
}

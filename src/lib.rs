//! relaybot - IRC multi-network relay
//!
//! Joins one channel on each configured IRC network and forwards every
//! message seen in one channel to all the others.

pub mod config;
pub mod error;
pub mod irc;
pub mod logging;
pub mod relay;

pub use config::{Config, NetworkConfig};
pub use error::{RelayError, Result};
pub use relay::{Communicator, Event, Mode, Runner, Session, SessionHandle, SessionState, Transport};

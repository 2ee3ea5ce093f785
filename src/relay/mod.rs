//! Relay core: sessions, the shared registry and reconnection.

pub mod behavior;
pub mod communicator;
pub mod event;
pub mod reclaim;
pub mod reconnect;
pub mod runner;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use behavior::{Behavior, Mode, NickFormat};
pub use communicator::{Communicator, SessionHandle};
pub use event::Event;
pub use reclaim::{ReclaimPhase, ReclaimState};
pub use reconnect::ReconnectPolicy;
pub use runner::Runner;
pub use session::{Session, SessionState};
pub use transport::Transport;

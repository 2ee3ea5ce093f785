//! Minimal IRC client.
//!
//! Covers what the relay needs: connecting over TCP or TLS, registration,
//! keep-alive and translating server messages into relay events.

pub mod client;
pub mod connection;
pub mod message;

pub use client::{ClientState, IrcClient, IrcSender, Registration};
pub use connection::{connect, BoxedStream, IrcStream};
pub use message::{Command, Message};

//! Relay session for one network.
//!
//! A [`Session`] owns the lifecycle of one configured network:
//! connection state, the nick it currently holds, its behavior variant
//! and, for NickServ modes, the reclamation state machine. It consumes
//! [`Event`]s one at a time and talks to the network through a
//! [`Transport`] and to the other networks through the [`Communicator`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::behavior::{strip_metadata, Behavior};
use super::communicator::{Communicator, SessionHandle};
use super::event::Event;
use super::reclaim::ReclaimState;
use super::transport::Transport;
use crate::config::NetworkConfig;
use crate::irc::Command;
use crate::{RelayError, Result};

/// Longest nickname RFC 2812 guarantees servers accept.
const RFC_MAX_NICK_LENGTH: usize = 9;

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection; the runner will schedule a new attempt.
    #[default]
    Disconnected,
    /// Connecting or registering.
    Connecting,
    /// Registered with the server, channel not joined yet.
    Connected,
    /// In the channel and registered with the communicator.
    Joined,
}

/// Relay session for one network.
pub struct Session {
    config: NetworkConfig,
    identifier: String,
    behavior: Behavior,
    communicator: Arc<Communicator>,
    state: SessionState,
    nickname: String,
    transport: Option<Arc<dyn Transport>>,
    reclaim: Option<ReclaimState>,
}

impl Session {
    /// Create a session for a configured network.
    pub fn new(config: NetworkConfig, communicator: Arc<Communicator>) -> Self {
        let identifier = config.identifier();
        info!(
            network = %identifier,
            "IRC relay created. Name: {} | Host: {} | Channel: {} | Mode: {}",
            config.nickname, config.host, config.channel, config.mode
        );
        if config.nickname.len() > RFC_MAX_NICK_LENGTH {
            warn!(
                network = %identifier,
                "Nickname {} is {} characters long, which exceeds the RFC maximum of {} characters. This may cause connection problems.",
                config.nickname,
                config.nickname.len(),
                RFC_MAX_NICK_LENGTH
            );
        }

        Self {
            behavior: config.mode.behavior(),
            nickname: config.nickname.clone(),
            identifier,
            config,
            communicator,
            state: SessionState::Disconnected,
            transport: None,
            reclaim: None,
        }
    }

    /// Get the registry identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the network configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Get the behavior variant.
    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the nick currently held on the network.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Get the reclamation state, if this variant reclaims nicks.
    pub fn reclaim(&self) -> Option<&ReclaimState> {
        self.reclaim.as_ref()
    }

    /// Whether heartbeat pings should be sent.
    pub fn heartbeat_active(&self) -> bool {
        matches!(self.state, SessionState::Connected | SessionState::Joined)
    }

    /// Whether the reclamation poll timer should be running.
    pub fn reclaim_polling(&self) -> bool {
        self.reclaim.as_ref().is_some_and(ReclaimState::is_polling)
    }

    /// A connection attempt is starting.
    pub fn begin_connect(&mut self) {
        debug!(network = %self.identifier, "Connecting to {}:{}", self.config.host, self.config.port);
        self.state = SessionState::Connecting;
    }

    /// The link is up; outbound commands now go to `transport`.
    pub fn attach(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Format a raw nick or prefix for display.
    pub fn format_nick<'a>(&self, raw: &'a str) -> &'a str {
        self.behavior.nick_format.apply(raw)
    }

    /// Relay `message` to every other joined network.
    pub fn relay(&self, message: &str) -> usize {
        self.communicator.relay(&self.identifier, message)
    }

    /// Send `message` to our channel. Read-only variants drop it.
    pub fn say_to_channel(&self, message: &str) -> Result<()> {
        match self.session_handle() {
            Some(handle) => handle.say_to_channel(message),
            None => Err(RelayError::ChannelClosed(self.identifier.clone())),
        }
    }

    /// Leave the network: QUIT, unregister and drop the connection.
    pub fn shutdown(&mut self, reason: &str) {
        if self.transport.is_some() {
            self.send(Command::Quit(Some(reason.to_string())));
        }
        self.disconnect();
    }

    /// Handle one event to completion.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Connected { nickname } => self.on_connected(nickname),
            Event::Disconnected { reason } => {
                info!(network = %self.identifier, "Connection lost ({}), unregistering.", reason);
                self.disconnect();
            }
            Event::Joined { channel } => self.on_joined(&channel),
            Event::Kicked {
                channel,
                kicker,
                message,
            } => {
                if !self.is_our_channel(&channel) {
                    return;
                }
                info!(network = %self.identifier, "Kicked by {}. Message \"{}\"", kicker, message);
                self.shutdown("Kicked");
            }
            Event::Privmsg { user, target, text } => self.on_privmsg(&user, &target, &text),
            Event::Action { user, target, text } => {
                if self.is_our_channel(&target) {
                    self.relay(&format!("* {} {}", self.format_nick(&user), text));
                }
            }
            Event::UserJoined { user, channel } => {
                if self.is_our_channel(&channel) {
                    self.relay_presence(format!("{} joined.", self.format_nick(&user)));
                }
            }
            Event::UserLeft { user, channel } => {
                if self.is_our_channel(&channel) {
                    self.relay_presence(format!("{} left.", self.format_nick(&user)));
                }
            }
            Event::UserQuit { user, message } => {
                self.relay_presence(format!("{} quit. ({})", self.format_nick(&user), message));
            }
            Event::UserRenamed { old, new } => {
                self.relay_presence(format!(
                    "{} is now known as {}.",
                    self.format_nick(&old),
                    self.format_nick(&new)
                ));
            }
            Event::NickChanged { nickname } => {
                info!(network = %self.identifier, "Nick changed from {} to {}.", self.nickname, nickname);
                self.nickname = nickname;
                let joined = self.state == SessionState::Joined;
                if let Some(reclaim) = self.reclaim.as_mut() {
                    let commands = reclaim.on_nick_changed(&self.nickname, joined);
                    self.send_all(commands);
                }
            }
            Event::Notice { user, target, text } => {
                debug!(network = %self.identifier, "Received notice \"{}\" from {} to {}.", text, user, target);
                if let Some(reclaim) = self.reclaim.as_mut() {
                    let commands = reclaim.on_notice(&user, &text);
                    self.send_all(commands);
                }
            }
            Event::HeartbeatTick => {
                if self.heartbeat_active() {
                    self.send(Command::Ping(self.config.host.clone()));
                }
            }
            Event::ReclaimPoll => {
                if let Some(reclaim) = self.reclaim.as_mut() {
                    let commands = reclaim.on_poll();
                    self.send_all(commands);
                }
            }
        }
    }

    fn on_connected(&mut self, nickname: String) {
        info!(network = %self.identifier, "Connected to network as {}.", nickname);
        self.nickname = nickname;
        self.state = SessionState::Connected;
        self.reclaim = match (&self.config.nickserv_password, self.behavior.reclaim) {
            (Some(password), true) => Some(ReclaimState::new(
                self.config.nickname.as_str(),
                self.nickname.as_str(),
                password.as_str(),
            )),
            _ => None,
        };
        self.send(Command::Join(self.config.channel.clone()));
    }

    fn on_joined(&mut self, channel: &str) {
        if !self.is_our_channel(channel) {
            debug!(network = %self.identifier, "Joined unexpected channel {}", channel);
            return;
        }
        let Some(handle) = self.session_handle() else {
            warn!(network = %self.identifier, "Join confirmed without a connection");
            return;
        };

        info!(network = %self.identifier, "Joined channel {}, registering.", channel);
        self.state = SessionState::Joined;
        self.communicator.register(handle);

        if let Some(reclaim) = self.reclaim.as_mut() {
            let commands = reclaim.evaluate();
            self.send_all(commands);
        }
    }

    fn on_privmsg(&mut self, user: &str, target: &str, text: &str) {
        if target.eq_ignore_ascii_case(&self.nickname) {
            info!(network = %self.identifier, "Received privmsg from {}.", user);
            self.send(Command::privmsg(strip_metadata(user), self.config.info.as_str()));
            return;
        }
        if !self.is_our_channel(target) {
            return;
        }

        self.relay(&format!("[{}] {}", self.format_nick(user), text));

        // Anyone addressing the bot in the channel gets the info text, and
        // the other networks see the answer too.
        if text.starts_with(&format!("{}:", self.nickname)) {
            if let Err(e) = self.say_to_channel(&self.config.info) {
                warn!(network = %self.identifier, "Failed to answer in channel: {}", e);
            }
            self.relay(&format!(
                "[{}] {}",
                self.format_nick(&self.nickname),
                self.config.info
            ));
        }
    }

    fn relay_presence(&self, message: String) {
        if self.behavior.relay_presence {
            self.relay(&message);
        }
    }

    fn is_our_channel(&self, channel: &str) -> bool {
        channel.eq_ignore_ascii_case(&self.config.channel)
    }

    fn session_handle(&self) -> Option<SessionHandle> {
        self.transport.as_ref().map(|transport| {
            SessionHandle::new(
                self.identifier.as_str(),
                self.config.channel.as_str(),
                self.behavior.outbound,
                Arc::clone(transport),
            )
        })
    }

    fn disconnect(&mut self) {
        self.communicator.unregister(&self.identifier);
        self.state = SessionState::Disconnected;
        self.transport = None;
        self.reclaim = None;
    }

    fn send(&self, command: Command) {
        match &self.transport {
            Some(transport) => {
                if let Err(e) = transport.send(command) {
                    warn!(network = %self.identifier, "Failed to send command: {}", e);
                }
            }
            None => debug!(network = %self.identifier, "Not connected, dropping {:?}", command),
        }
    }

    fn send_all(&self, commands: Vec<Command>) {
        for command in commands {
            self.send(command);
        }
    }
}

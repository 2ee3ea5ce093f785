//! NickServ nick reclamation.
//!
//! After a reconnect the server may still hold our previous connection,
//! so we come back as `bot_` instead of `bot`. This state machine asks
//! NickServ to GHOST the stale client and then takes the nick back. A
//! poll keeps retrying in case NickServ never answers.

use tracing::{debug, info};

use super::behavior::strip_metadata;
use crate::irc::Command;

/// Nick of the identity service.
pub const NICKSERV: &str = "NickServ";

/// Progress of the reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimPhase {
    /// We hold the desired nick.
    Satisfied,
    /// GHOST (or a nick change) was requested; waiting on NickServ or the server.
    AwaitingRecoveryResponse,
    /// NickServ stayed silent; the poll keeps requesting the nick.
    Polling,
}

/// Reclamation state of one session.
#[derive(Debug, Clone)]
pub struct ReclaimState {
    desired: String,
    actual: String,
    password: String,
    phase: ReclaimPhase,
    polling: bool,
}

impl ReclaimState {
    /// Create the state at sign-on.
    ///
    /// Nothing is requested until [`ReclaimState::evaluate`] runs.
    pub fn new(
        desired: impl Into<String>,
        actual: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let desired = desired.into();
        let actual = actual.into();
        let phase = if desired.eq_ignore_ascii_case(&actual) {
            ReclaimPhase::Satisfied
        } else {
            ReclaimPhase::AwaitingRecoveryResponse
        };
        Self {
            desired,
            actual,
            password: password.into(),
            phase,
            polling: false,
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> ReclaimPhase {
        self.phase
    }

    /// Whether the poll timer should be running.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Get the nick we currently hold.
    pub fn actual(&self) -> &str {
        &self.actual
    }

    fn has_desired(&self) -> bool {
        self.desired.eq_ignore_ascii_case(&self.actual)
    }

    fn satisfy(&mut self) {
        self.phase = ReclaimPhase::Satisfied;
        self.polling = false;
    }

    fn request_nick(&self) -> Command {
        Command::Nick(self.desired.clone())
    }

    /// Compare nicks and start a GHOST if they differ.
    ///
    /// Starts the poll if it is not already running.
    pub fn evaluate(&mut self) -> Vec<Command> {
        if self.has_desired() {
            self.satisfy();
            return Vec::new();
        }

        info!("Using GHOST to reclaim nick {}", self.desired);
        self.phase = ReclaimPhase::AwaitingRecoveryResponse;
        self.polling = true;
        vec![Command::privmsg(
            NICKSERV,
            format!("GHOST {} {}", self.desired, self.password),
        )]
    }

    /// React to a NOTICE. Notices from anyone but NickServ are ignored.
    pub fn on_notice(&mut self, user: &str, text: &str) -> Vec<Command> {
        if !strip_metadata(user).eq_ignore_ascii_case(NICKSERV) {
            return Vec::new();
        }

        let text = strip_formatting(text).to_lowercase();
        let text = text.trim();

        if text.starts_with("this nickname is registered and protected") {
            info!("Password requested; identifying with {}", NICKSERV);
            return vec![Command::privmsg(
                NICKSERV,
                format!("IDENTIFY {}", self.password),
            )];
        }

        let ghost_killed = text.starts_with("ghost with your nick") && text.ends_with("has been killed.");
        let not_in_use = text.ends_with("isn't currently in use.");

        if ghost_killed || not_in_use {
            if self.has_desired() {
                debug!("NickServ notice while already holding {}", self.desired);
                return Vec::new();
            }
            if ghost_killed {
                info!("GHOST successful, reclaiming nick {}", self.desired);
            } else {
                info!("GHOST not needed, reclaiming nick {}", self.desired);
            }
            self.phase = ReclaimPhase::AwaitingRecoveryResponse;
            return vec![self.request_nick()];
        }

        debug!("Ignoring NickServ notice: {}", text);
        Vec::new()
    }

    /// Poll tick.
    pub fn on_poll(&mut self) -> Vec<Command> {
        if !self.polling {
            return Vec::new();
        }
        if self.has_desired() {
            debug!("Have desired nick {}, stopping poll", self.desired);
            self.satisfy();
            return Vec::new();
        }
        debug!("Reclaiming desired nick {} in polling", self.desired);
        self.phase = ReclaimPhase::Polling;
        vec![self.request_nick()]
    }

    /// The server confirmed a new nick for us.
    ///
    /// If it is not the desired one and we are already in the channel,
    /// reclamation starts over.
    pub fn on_nick_changed(&mut self, nickname: &str, joined: bool) -> Vec<Command> {
        self.actual = nickname.to_string();
        if self.has_desired() {
            self.satisfy();
            Vec::new()
        } else if joined {
            self.evaluate()
        } else {
            Vec::new()
        }
    }
}

/// Remove mIRC bold, italic, underline, reverse and reset codes.
fn strip_formatting(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\x02' | '\x1d' | '\x1f' | '\x16' | '\x0f'))
        .collect()
}

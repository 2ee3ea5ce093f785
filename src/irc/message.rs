//! IRC line parsing and command encoding.
//!
//! Only the subset of RFC 2812 the relay needs is covered: optional
//! prefix, command word or numeric, middle parameters and a trailing
//! parameter. IRCv3 tags are skipped.

use std::fmt;

use crate::{RelayError, Result};

/// A parsed line received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Source of the message (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command word, uppercased, or a three-digit numeric.
    pub command: String,
    /// Parameters, with the trailing parameter last.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a single line, without the trailing CRLF.
    pub fn parse(line: &str) -> Result<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // Message tags are not used.
        if rest.starts_with('@') {
            rest = rest.split_once(' ').map(|(_, r)| r).unwrap_or("");
        }
        rest = rest.trim_start();

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = r.trim_start();
            Some(prefix.to_string())
        } else {
            None
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(RelayError::Protocol(format!("no command in line '{line}'")));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, r) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_string());
            rest = r;
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of the prefix, if any.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split('!').next().unwrap_or(p))
    }

    /// Get parameter `index`, or an empty string.
    pub fn param(&self, index: usize) -> &str {
        self.params.get(index).map(String::as_str).unwrap_or("")
    }
}

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pass(String),
    Nick(String),
    User { username: String, realname: String },
    Join(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Ping(String),
    Pong(String),
    Quit(Option<String>),
}

impl Command {
    /// Shorthand for a `PRIVMSG`.
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::Privmsg {
            target: target.into(),
            text: text.into(),
        }
    }
}

/// Drop CR and LF so one command can never turn into two lines.
fn clean(s: &str) -> String {
    s.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pass(password) => write!(f, "PASS {}", clean(password)),
            Command::Nick(nick) => write!(f, "NICK {}", clean(nick)),
            Command::User { username, realname } => {
                write!(f, "USER {} 0 * :{}", clean(username), clean(realname))
            }
            Command::Join(channel) => write!(f, "JOIN {}", clean(channel)),
            Command::Privmsg { target, text } => {
                write!(f, "PRIVMSG {} :{}", clean(target), clean(text))
            }
            Command::Notice { target, text } => {
                write!(f, "NOTICE {} :{}", clean(target), clean(text))
            }
            Command::Ping(token) => write!(f, "PING :{}", clean(token)),
            Command::Pong(token) => write!(f, "PONG :{}", clean(token)),
            Command::Quit(Some(reason)) => write!(f, "QUIT :{}", clean(reason)),
            Command::Quit(None) => write!(f, "QUIT"),
        }
    }
}

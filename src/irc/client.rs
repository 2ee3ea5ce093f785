//! IRC client: registration, keep-alive and event translation.
//!
//! [`IrcClient::start`] takes an established stream and spawns a reader
//! and a writer task. Outbound commands are queued through [`IrcSender`];
//! inbound lines are translated into [`Event`]s by [`ClientState`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::message::{Command, Message};
use crate::config::NetworkConfig;
use crate::relay::{Event, Transport};
use crate::{RelayError, Result};

/// How long [`IrcClient::finish`] waits for queued commands to be written.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

const CTCP_DELIMITER: char = '\u{1}';

/// Credentials sent when registering with the server.
#[derive(Debug, Clone)]
pub struct Registration {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
}

impl From<&NetworkConfig> for Registration {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            nickname: config.nickname.clone(),
            username: config.username.clone(),
            realname: config.realname.clone(),
            password: config.password.clone(),
        }
    }
}

/// Translates server messages into events and automatic replies.
#[derive(Debug, Clone)]
pub struct ClientState {
    nickname: String,
    registered: bool,
}

impl ClientState {
    /// Create the state for a connection registering as `nickname`.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            registered: false,
        }
    }

    /// Get the nick the server knows us by (or the one being tried).
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Check if registration has completed.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn is_me(&self, nick: Option<&str>) -> bool {
        nick.is_some_and(|n| n.eq_ignore_ascii_case(&self.nickname))
    }

    /// Process one message. Returns the events for the session and the
    /// commands to send back right away.
    pub fn process(&mut self, msg: &Message) -> (Vec<Event>, Vec<Command>) {
        let mut events = Vec::new();
        let mut replies = Vec::new();
        let prefix = msg.prefix.clone().unwrap_or_default();

        match msg.command.as_str() {
            "PING" => replies.push(Command::Pong(msg.param(0).to_string())),
            // RPL_WELCOME
            "001" => {
                self.registered = true;
                if !msg.param(0).is_empty() {
                    self.nickname = msg.param(0).to_string();
                }
                events.push(Event::Connected {
                    nickname: self.nickname.clone(),
                });
            }
            // ERR_NICKNAMEINUSE, ERR_UNAVAILRESOURCE
            "433" | "437" => {
                if !self.registered {
                    self.nickname.push('_');
                    debug!("Nick in use, trying {}", self.nickname);
                    replies.push(Command::Nick(self.nickname.clone()));
                }
            }
            "JOIN" => {
                let channel = msg.param(0).to_string();
                if self.is_me(msg.source_nick()) {
                    events.push(Event::Joined { channel });
                } else {
                    events.push(Event::UserJoined {
                        user: prefix,
                        channel,
                    });
                }
            }
            "PART" => {
                if !self.is_me(msg.source_nick()) {
                    events.push(Event::UserLeft {
                        user: prefix,
                        channel: msg.param(0).to_string(),
                    });
                }
            }
            "QUIT" => events.push(Event::UserQuit {
                user: prefix,
                message: msg.param(0).to_string(),
            }),
            "NICK" => {
                let new = msg.param(0).to_string();
                if self.is_me(msg.source_nick()) {
                    self.nickname = new.clone();
                    events.push(Event::NickChanged { nickname: new });
                } else {
                    events.push(Event::UserRenamed { old: prefix, new });
                }
            }
            "KICK" => {
                if self.is_me(Some(msg.param(1))) {
                    events.push(Event::Kicked {
                        channel: msg.param(0).to_string(),
                        kicker: msg.source_nick().unwrap_or_default().to_string(),
                        message: msg.param(2).to_string(),
                    });
                }
            }
            "PRIVMSG" => {
                let target = msg.param(0).to_string();
                let text = msg.param(1);
                match ctcp_body(text) {
                    Some(body) => {
                        if let Some(action) = body.strip_prefix("ACTION ") {
                            events.push(Event::Action {
                                user: prefix,
                                target,
                                text: action.to_string(),
                            });
                        } else if let (Some(reply), Some(nick)) = (ctcp_reply(body), msg.source_nick()) {
                            replies.push(Command::Notice {
                                target: nick.to_string(),
                                text: format!("{CTCP_DELIMITER}{reply}{CTCP_DELIMITER}"),
                            });
                        } else {
                            trace!("Ignoring CTCP {}", body);
                        }
                    }
                    None => events.push(Event::Privmsg {
                        user: prefix,
                        target,
                        text: text.to_string(),
                    }),
                }
            }
            "NOTICE" => events.push(Event::Notice {
                user: prefix,
                target: msg.param(0).to_string(),
                text: msg.param(1).to_string(),
            }),
            "ERROR" => warn!("Server error: {}", msg.param(0)),
            _ => {}
        }

        (events, replies)
    }
}

/// Body of a CTCP message, without the delimiters.
fn ctcp_body(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIMITER)?;
    Some(inner.strip_suffix(CTCP_DELIMITER).unwrap_or(inner))
}

/// Answer to a CTCP query, sent back as a NOTICE. Only VERSION and PING
/// are answered.
fn ctcp_reply(body: &str) -> Option<String> {
    match body.split_once(' ') {
        Some(("PING", _)) => Some(body.to_string()),
        None if body == "VERSION" => Some(format!("VERSION relaybot {}", env!("CARGO_PKG_VERSION"))),
        _ => None,
    }
}

/// Queue of outbound commands for one connection.
#[derive(Debug, Clone)]
pub struct IrcSender {
    identifier: String,
    tx: mpsc::UnboundedSender<Command>,
}

impl Transport for IrcSender {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| RelayError::ChannelClosed(self.identifier.clone()))
    }
}

/// A running IRC connection.
///
/// Dropping the client stops the reader; the writer ends once every
/// sender is gone.
pub struct IrcClient {
    sender: Arc<IrcSender>,
    events: mpsc::UnboundedReceiver<Event>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl IrcClient {
    /// Spawn reader and writer tasks on `stream` and queue registration.
    pub fn start<S>(stream: S, identifier: impl Into<String>, registration: Registration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let identifier = identifier.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // The receiver is alive, so these cannot fail.
        if let Some(password) = registration.password {
            let _ = cmd_tx.send(Command::Pass(password));
        }
        let _ = cmd_tx.send(Command::Nick(registration.nickname.clone()));
        let _ = cmd_tx.send(Command::User {
            username: registration.username,
            realname: registration.realname,
        });

        let writer = tokio::spawn(write_loop(write_half, cmd_rx, identifier.clone()));
        let reader = tokio::spawn(read_loop(
            read_half,
            ClientState::new(registration.nickname),
            cmd_tx.clone(),
            event_tx,
            identifier.clone(),
        ));

        Self {
            sender: Arc::new(IrcSender {
                identifier,
                tx: cmd_tx,
            }),
            events: event_rx,
            reader,
            writer: Some(writer),
        }
    }

    /// Get the outbound queue.
    pub fn sender(&self) -> Arc<IrcSender> {
        Arc::clone(&self.sender)
    }

    /// Wait for the next event. `None` once the reader has stopped and
    /// every event was consumed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Stop reading and give the writer a moment to flush queued
    /// commands such as QUIT.
    pub async fn finish(mut self) {
        self.reader.abort();
        let writer = self.writer.take();
        drop(self);
        if let Some(writer) = writer {
            let _ = tokio::time::timeout(FLUSH_TIMEOUT, writer).await;
        }
    }
}

impl Drop for IrcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    reader: R,
    mut state: ClientState,
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: mpsc::UnboundedSender<Event>,
    identifier: String,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);

    let reason = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break "connection closed by server".to_string(),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                trace!(network = %identifier, "<< {}", line);

                let msg = match Message::parse(line) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(network = %identifier, "Ignoring line: {}", e);
                        continue;
                    }
                };

                let (events, replies) = state.process(&msg);
                for reply in replies {
                    let _ = cmd_tx.send(reply);
                }
                for event in events {
                    if event_tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    let _ = event_tx.send(Event::Disconnected { reason });
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Command>, identifier: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let line = command.to_string();
        trace!(network = %identifier, ">> {}", line);
        if let Err(e) = writer.write_all(format!("{line}\r\n").as_bytes()).await {
            warn!(network = %identifier, "Write failed: {}", e);
            break;
        }
        if matches!(command, Command::Quit(_)) {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

//! Test helpers for relay integration tests.
//!
//! Provides a recording transport, network builders and a scripted IRC
//! server for loopback tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use relaybot::irc::Command;
use relaybot::{Communicator, Event, Mode, NetworkConfig, Session, Transport};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that records every command instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Command>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Texts of the PRIVMSGs sent to `target`.
    pub fn messages_to(&self, target: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|c| match c {
                Command::Privmsg { target: t, text } if t == target => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, command: Command) -> relaybot::Result<()> {
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}

/// Build a network config for tests.
pub fn network(name: &str, host: &str, port: u16, channel: &str, mode: Mode) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        host: host.to_string(),
        port,
        use_tls: false,
        connect_timeout: Duration::from_secs(5),
        nickname: "relay".to_string(),
        channel: channel.to_string(),
        info: "I relay messages between networks.".to_string(),
        heartbeat_interval: Duration::from_secs(60),
        password: None,
        username: "relay".to_string(),
        realname: "Relay Bot".to_string(),
        mode,
        nickserv_password: Some("secret".to_string()),
    }
}

/// Create a session and bring it to the joined state on a recording
/// transport.
pub fn joined_session(
    config: NetworkConfig,
    communicator: &Arc<Communicator>,
) -> (Session, Arc<RecordingTransport>) {
    let channel = config.channel.clone();
    let nickname = config.nickname.clone();
    let transport = Arc::new(RecordingTransport::default());
    let mut session = Session::new(config, Arc::clone(communicator));
    session.begin_connect();
    session.attach(transport.clone());
    session.handle(Event::Connected { nickname });
    session.handle(Event::Joined { channel });
    transport.clear();
    (session, transport)
}

/// Channel message event.
pub fn say(user: &str, channel: &str, text: &str) -> Event {
    Event::Privmsg {
        user: user.to_string(),
        target: channel.to_string(),
        text: text.to_string(),
    }
}

/// One end of a scripted IRC server connection.
pub struct FakeServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeServerConn {
    /// Accept the next client on `listener`.
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(DEFAULT_TIMEOUT, listener.accept())
            .await
            .expect("timed out waiting for client")
            .expect("accept failed");
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Read one line without the line ending. `None` on EOF.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out reading from client")
            .expect("read failed");
        if n == 0 {
            None
        } else {
            Some(line.trim_end().to_string())
        }
    }

    /// Read lines until one starts with `prefix` and return it.
    pub async fn expect_line(&mut self, prefix: &str) -> String {
        loop {
            match self.read_line().await {
                Some(line) if line.starts_with(prefix) => return line,
                Some(_) => continue,
                None => panic!("connection closed before {prefix:?}"),
            }
        }
    }

    /// Send a raw line; CRLF is appended.
    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("write failed");
    }

    /// Walk the client through registration and its channel join.
    pub async fn welcome(&mut self, nick: &str, channel: &str) {
        self.expect_line("USER ").await;
        self.send(&format!(":irc.test 001 {nick} :Welcome")).await;
        self.expect_line(&format!("JOIN {channel}")).await;
        self.send(&format!(":{nick}!{nick}@test JOIN {channel}")).await;
    }
}

/// Poll `check` until it returns true or the default timeout passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

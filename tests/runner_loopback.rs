//! Runner tests against a scripted IRC server on localhost.

mod common;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use common::{eventually, network, FakeServerConn, RecordingTransport, DEFAULT_TIMEOUT};
use relaybot::{Communicator, Config, Mode, Runner, SessionHandle};

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn fast_reconnect() -> Config {
    let mut config = Config::default();
    config.reconnect.initial_delay_secs = 0.1;
    config.reconnect.max_delay_secs = 0.5;
    config.reconnect.jitter = 0.0;
    config
}

/// Register a recording peer network so relayed lines can be observed.
fn observer(communicator: &Communicator) -> Arc<RecordingTransport> {
    let transport = Arc::new(RecordingTransport::default());
    communicator.register(SessionHandle::new("observer", "#peer", true, transport.clone()));
    transport
}

#[tokio::test]
async fn test_runner_relays_and_quits() {
    let (listener, port) = listener().await;
    let communicator = Arc::new(Communicator::new());
    let peer = observer(&communicator);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = Runner::for_network(
        network("local", "127.0.0.1", port, "#x", Mode::Default),
        &fast_reconnect(),
        Arc::clone(&communicator),
        shutdown_rx,
    );
    let identifier = runner.session().identifier().to_string();
    let task = tokio::spawn(runner.run());

    let mut server = FakeServerConn::accept(&listener).await;
    assert_eq!(server.read_line().await.as_deref(), Some("NICK relay"));
    server.welcome("relay", "#x").await;

    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    server.send("PING :keepalive").await;
    assert_eq!(server.expect_line("PONG").await, "PONG :keepalive");

    server.send(":alice!a@host PRIVMSG #x :hello from local").await;
    assert!(eventually(|| peer.messages_to("#peer") == vec!["[alice] hello from local"]).await);

    shutdown_tx.send(true).unwrap();
    assert_eq!(server.expect_line("QUIT").await, "QUIT :Shutting down");

    timeout(DEFAULT_TIMEOUT, task).await.unwrap().unwrap();
    assert!(!communicator.is_registered(&identifier));
}

#[tokio::test]
async fn test_runner_reconnects_after_server_drop() {
    let (listener, port) = listener().await;
    let communicator = Arc::new(Communicator::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = Runner::for_network(
        network("local", "127.0.0.1", port, "#x", Mode::Default),
        &fast_reconnect(),
        Arc::clone(&communicator),
        shutdown_rx,
    );
    let identifier = runner.session().identifier().to_string();
    let task = tokio::spawn(runner.run());

    let mut first = FakeServerConn::accept(&listener).await;
    first.welcome("relay", "#x").await;
    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    drop(first);
    assert!(eventually(|| !communicator.is_registered(&identifier)).await);

    let mut second = FakeServerConn::accept(&listener).await;
    second.welcome("relay", "#x").await;
    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    shutdown_tx.send(true).unwrap();
    timeout(DEFAULT_TIMEOUT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_runner_rejoins_after_kick() {
    let (listener, port) = listener().await;
    let communicator = Arc::new(Communicator::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = Runner::for_network(
        network("local", "127.0.0.1", port, "#x", Mode::Default),
        &fast_reconnect(),
        Arc::clone(&communicator),
        shutdown_rx,
    );
    let identifier = runner.session().identifier().to_string();
    let task = tokio::spawn(runner.run());

    let mut first = FakeServerConn::accept(&listener).await;
    first.welcome("relay", "#x").await;
    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    first.send(":op!o@host KICK #x relay :go away").await;
    assert_eq!(first.expect_line("QUIT").await, "QUIT :Kicked");
    assert!(!communicator.is_registered(&identifier));

    let mut second = FakeServerConn::accept(&listener).await;
    second.welcome("relay", "#x").await;
    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    shutdown_tx.send(true).unwrap();
    timeout(DEFAULT_TIMEOUT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_runner_retries_when_server_never_welcomes() {
    let (listener, port) = listener().await;
    let communicator = Arc::new(Communicator::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut config = network("silent", "127.0.0.1", port, "#x", Mode::Default);
    config.connect_timeout = std::time::Duration::from_secs(1);
    let runner = Runner::for_network(
        config,
        &fast_reconnect(),
        Arc::clone(&communicator),
        shutdown_rx,
    );
    let identifier = runner.session().identifier().to_string();
    let task = tokio::spawn(runner.run());

    // Accept and stay silent; the socket is kept open.
    let mut silent = FakeServerConn::accept(&listener).await;
    silent.expect_line("USER ").await;

    let mut second = FakeServerConn::accept(&listener).await;
    second.welcome("relay", "#x").await;
    assert!(eventually(|| communicator.is_registered(&identifier)).await);

    shutdown_tx.send(true).unwrap();
    timeout(DEFAULT_TIMEOUT, task).await.unwrap().unwrap();
    drop(silent);
}

#[tokio::test]
async fn test_runner_stops_while_waiting_to_reconnect() {
    // Nothing listens on this port.
    let port = {
        let (listener, port) = listener().await;
        drop(listener);
        port
    };
    let communicator = Arc::new(Communicator::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut config = Config::default();
    config.reconnect.initial_delay_secs = 60.0;
    config.reconnect.jitter = 0.0;
    let runner = Runner::for_network(
        network("gone", "127.0.0.1", port, "#x", Mode::Default),
        &config,
        Arc::clone(&communicator),
        shutdown_rx,
    );
    let task = tokio::spawn(runner.run());

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    timeout(DEFAULT_TIMEOUT, task).await.unwrap().unwrap();
    assert!(communicator.is_empty());
}

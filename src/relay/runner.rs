//! Per-network connection loop.
//!
//! A [`Runner`] owns one [`Session`]. It connects, feeds the session the
//! events of the connection and its timers, and reconnects with backoff
//! whenever the session ends up disconnected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use super::communicator::Communicator;
use super::event::Event;
use super::reconnect::ReconnectPolicy;
use super::session::{Session, SessionState};
use crate::config::{Config, NetworkConfig};
use crate::irc::{self, IrcClient, Registration};

/// Reason sent with QUIT when the process stops.
const SHUTDOWN_REASON: &str = "Shutting down";

/// Drives one session for the lifetime of the process.
pub struct Runner {
    session: Session,
    policy: ReconnectPolicy,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Runner {
    /// Create a runner. `shutdown` flipping to `true` stops it.
    pub fn new(
        session: Session,
        policy: ReconnectPolicy,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            policy,
            poll_interval: poll_interval.max(Duration::from_secs(1)),
            shutdown,
        }
    }

    /// Create a runner for `network` using the global reconnect and
    /// reclaim settings.
    pub fn for_network(
        network: NetworkConfig,
        config: &Config,
        communicator: Arc<Communicator>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self::new(
            Session::new(network, communicator),
            ReconnectPolicy::new(&config.reconnect),
            Duration::from_secs(config.reclaim.poll_interval_secs),
            shutdown,
        )
    }

    /// Get the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        let identifier = self.session.identifier().to_string();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.session.begin_connect();
            let config = self.session.config().clone();
            info!(
                network = %identifier,
                "Connecting to {}:{}{}",
                config.host,
                config.port,
                if config.use_tls { " (TLS)" } else { "" }
            );

            let connected = tokio::select! {
                result = irc::connect(&config.host, config.port, config.use_tls, config.connect_timeout) => result,
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            };

            match connected {
                Ok(stream) => {
                    let client = IrcClient::start(stream, identifier.clone(), Registration::from(&config));
                    if self.drive(client).await {
                        break;
                    }
                }
                Err(e) => {
                    self.session.handle(Event::Disconnected {
                        reason: e.to_string(),
                    });
                    warn!(
                        network = %identifier,
                        attempt = self.policy.attempts() + 1,
                        "Connection failed: {}",
                        e
                    );
                }
            }

            let delay = self.policy.next_delay();
            info!(
                network = %identifier,
                "Reconnecting in {:.1} seconds",
                delay.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            }
        }

        info!(network = %identifier, "Runner stopped");
    }

    /// Feed the session until it disconnects. Returns `true` on shutdown.
    async fn drive(&mut self, mut client: IrcClient) -> bool {
        self.session.attach(client.sender());

        let timeout = self.session.config().connect_timeout;
        let registration_deadline = Instant::now() + timeout;
        let mut registered = false;
        let mut heartbeat: Option<Interval> = None;
        let mut poll: Option<Interval> = None;

        loop {
            match self.session.state() {
                SessionState::Disconnected => return false,
                SessionState::Connecting => {}
                SessionState::Connected | SessionState::Joined => {
                    if !registered {
                        registered = true;
                        self.policy.reset();
                    }
                }
            }
            let registering = !registered;
            sync_timer(
                &mut heartbeat,
                self.session.heartbeat_active(),
                self.session.config().heartbeat_interval,
            );
            sync_timer(&mut poll, self.session.reclaim_polling(), self.poll_interval);

            let event = tokio::select! {
                event = client.next_event() => event.unwrap_or_else(|| Event::Disconnected {
                    reason: "event stream closed".to_string(),
                }),
                _ = tick(&mut heartbeat) => Event::HeartbeatTick,
                _ = tick(&mut poll) => Event::ReclaimPoll,
                _ = tokio::time::sleep_until(registration_deadline), if registering => {
                    warn!(
                        network = %self.session.identifier(),
                        "No welcome from server within {} seconds",
                        timeout.as_secs()
                    );
                    Event::Disconnected {
                        reason: format!("registration timed out after {} seconds", timeout.as_secs()),
                    }
                }
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            };
            self.session.handle(event);
        }

        self.session.shutdown(SHUTDOWN_REASON);
        client.finish().await;
        true
    }
}

/// Start or stop a timer to match `active`. A new timer first fires one
/// period from now.
fn sync_timer(timer: &mut Option<Interval>, active: bool, period: Duration) {
    match (active, timer.is_some()) {
        (true, false) => {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *timer = Some(interval);
        }
        (false, true) => *timer = None,
        _ => {}
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolve once shutdown was requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

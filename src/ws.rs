//! WebSocket session with durable subscriptions.
//!
//! One spawned task owns the socket for the lifetime of the session. It
//! connects (with a handshake timeout), replays the subscription set,
//! then services three event sources in a single `select!` loop: the ping
//! interval, inbound frames, and the command channel. All socket writes
//! happen on that task, so they are serialized by construction.
//!
//! On a read error or server close the task sleeps for the reconnect
//! interval and dials again, replaying every active subscription exactly
//! once. After `max_reconnect_attempts` consecutive failed dials it emits
//! a terminal [`Incoming::Error`] and exits.
//!
//! Shutdown is explicit: a `Close` command ends the task, and
//! [`Connection::shutdown`] joins it. Once `shutdown` returns, no further
//! message is delivered and no further write is attempted. During
//! shutdown, socket operations that fail are ignored rather than logged or
//! retried.

use std::{
    collections::HashSet,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use futures::StreamExt;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::{interval, sleep, timeout},
};
use url::Url;
use yawc::Options;

use crate::{
    error::{Error, Result},
    types::{Incoming, Outgoing, Subscription},
};

/// Tunables for the WebSocket session.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Handshake deadline for each dial.
    pub connect_timeout: Duration,
    /// How often the client pings the server.
    pub ping_interval: Duration,
    /// Pause between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Consecutive failed dials before the session gives up.
    pub max_reconnect_attempts: u32,
    /// Frames larger than this are delivered as `Unknown` without parsing.
    pub max_message_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(1_500),
            max_reconnect_attempts: 10,
            max_message_size: 1 << 20,
        }
    }
}

/// The set of active subscriptions.
///
/// Pure set semantics: inserting an entry already present reports `false`
/// (and the caller sends nothing), removing an absent entry is a no-op.
/// `snapshot` copies the entries out so the reconnect path can replay them
/// without holding any lock while writing to the socket.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    entries: HashSet<Subscription>,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Returns false if it was already present.
    pub fn insert(&mut self, subscription: Subscription) -> bool {
        self.entries.insert(subscription)
    }

    /// Removes an entry. Returns false if it was not present.
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        self.entries.remove(subscription)
    }

    /// Copies the current entries for replay.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Command {
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    Close,
}

/// Cloneable handle for steering a running session.
#[derive(Clone)]
pub struct CommandSender {
    tx: UnboundedSender<Command>,
}

impl CommandSender {
    /// Requests a subscription. Idempotent: a duplicate request sends
    /// nothing to the server.
    pub fn subscribe(&self, subscription: Subscription) -> Result<()> {
        self.send(Command::Subscribe(subscription))
    }

    /// Requests an unsubscription. A no-op if not subscribed.
    pub fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.send(Command::Unsubscribe(subscription))
    }

    /// Asks the session task to stop. Does not wait for it; use
    /// [`Connection::shutdown`] to join.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::WebSocket("session terminated".into()))
    }
}

/// A live WebSocket session.
///
/// Implements [`futures::Stream`] yielding parsed [`Incoming`] messages.
/// Dropping the `Connection` closes the command channel, which ends the
/// session task; for a deterministic handoff use [`shutdown`](Self::shutdown).
pub struct Connection {
    rx: UnboundedReceiver<Incoming>,
    cmd: CommandSender,
    task: JoinHandle<()>,
}

impl Connection {
    /// Starts a session against `url`. The task dials immediately and
    /// keeps the connection alive until closed.
    #[must_use]
    pub fn connect(url: Url, config: WsConfig) -> Self {
        let (out_tx, out_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let task = tokio::spawn(run(url, config, out_tx, cmd_rx));
        Self {
            rx: out_rx,
            cmd: CommandSender { tx: cmd_tx },
            task,
        }
    }

    /// Returns a handle that can subscribe/unsubscribe/close from anywhere.
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        self.cmd.clone()
    }

    /// See [`CommandSender::subscribe`].
    pub fn subscribe(&self, subscription: Subscription) -> Result<()> {
        self.cmd.subscribe(subscription)
    }

    /// See [`CommandSender::unsubscribe`].
    pub fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.cmd.unsubscribe(subscription)
    }

    /// Stops the session and waits for the task to finish. After this
    /// returns, no further message will be delivered and no further write
    /// will be attempted.
    pub async fn shutdown(self) {
        self.cmd.close();
        let _ = self.task.await;
    }
}

impl futures::Stream for Connection {
    type Item = Incoming;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

struct Socket {
    stream: yawc::WebSocket,
    max_message_size: usize,
}

impl Socket {
    async fn connect(url: Url, max_message_size: usize) -> Result<Self> {
        let stream = yawc::WebSocket::connect(url)
            .with_options(Options::default().with_no_delay())
            .await
            .map_err(|err| Error::WebSocket(err.to_string()))?;
        Ok(Self {
            stream,
            max_message_size,
        })
    }

    async fn send(&mut self, frame: &Outgoing) -> Result<()> {
        self.stream
            .send_json(frame)
            .await
            .map_err(|err| Error::WebSocket(err.to_string()))
    }
}

impl futures::Stream for Socket {
    type Item = Incoming;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.stream.poll_next_unpin(cx)) {
            Some(frame) => {
                let payload = &frame.payload;
                if payload.len() > this.max_message_size {
                    log::warn!("dropping oversized frame ({} bytes)", payload.len());
                    return Poll::Ready(Some(Incoming::Unknown {
                        channel: String::new(),
                        raw: String::new(),
                    }));
                }
                Poll::Ready(Some(Incoming::parse(payload)))
            }
            None => Poll::Ready(None),
        }
    }
}

async fn run(
    url: Url,
    config: WsConfig,
    out: UnboundedSender<Incoming>,
    mut commands: UnboundedReceiver<Command>,
) {
    let mut subs = SubscriptionSet::new();
    let mut failed_dials: u32 = 0;

    loop {
        let dial = timeout(
            config.connect_timeout,
            Socket::connect(url.clone(), config.max_message_size),
        )
        .await;

        let mut socket = match dial {
            Ok(Ok(socket)) => socket,
            outcome => {
                match outcome {
                    Ok(Err(err)) => log::error!("unable to connect to {url}: {err}"),
                    _ => log::error!("timed out connecting to {url}"),
                }
                failed_dials += 1;
                if failed_dials > config.max_reconnect_attempts {
                    let _ = out.send(Incoming::Error(format!(
                        "giving up after {failed_dials} failed connection attempts"
                    )));
                    return;
                }
                // Keep draining commands while backing off so a Close
                // during an outage still stops the session promptly.
                tokio::select! {
                    _ = sleep(config.reconnect_interval) => continue,
                    cmd = commands.recv() => {
                        match cmd {
                            Some(Command::Subscribe(sub)) => { subs.insert(sub); }
                            Some(Command::Unsubscribe(sub)) => { subs.remove(&sub); }
                            Some(Command::Close) | None => return,
                        }
                        continue;
                    }
                }
            }
        };
        failed_dials = 0;
        log::debug!("connected to {url}");

        // Replay the durable subscription set, one frame per entry.
        let mut replay_failed = false;
        for sub in subs.snapshot() {
            log::debug!("replaying subscription {sub}");
            if socket
                .send(&Outgoing::Subscribe { subscription: sub })
                .await
                .is_err()
            {
                replay_failed = true;
                break;
            }
        }

        if !replay_failed {
            let mut ping = interval(config.ping_interval);
            ping.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ping.tick() => {
                        if socket.send(&Outgoing::Ping).await.is_err() {
                            break;
                        }
                    }
                    frame = socket.next() => {
                        let Some(msg) = frame else { break };
                        if let Incoming::Error(message) = &msg {
                            if message.to_ascii_lowercase().contains("subscription") {
                                log::warn!("{}", Error::SubscriptionLimitExceeded(message.clone()));
                            }
                        }
                        if out.send(msg).is_err() {
                            // Receiver gone; nothing left to deliver to.
                            return;
                        }
                    }
                    cmd = commands.recv() => {
                        match cmd {
                            Some(Command::Subscribe(sub)) => {
                                if !subs.insert(sub.clone()) {
                                    log::debug!("already subscribed to {sub}");
                                    continue;
                                }
                                if socket.send(&Outgoing::Subscribe { subscription: sub }).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Unsubscribe(sub)) => {
                                if !subs.remove(&sub) {
                                    continue;
                                }
                                if socket.send(&Outgoing::Unsubscribe { subscription: sub }).await.is_err() {
                                    break;
                                }
                            }
                            Some(Command::Close) | None => return,
                        }
                    }
                }
            }
        }

        log::debug!("disconnected from {url}; reconnecting");
        tokio::select! {
            _ = sleep(config.reconnect_interval) => {}
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Subscribe(sub)) => { subs.insert(sub); }
                    Some(Command::Unsubscribe(sub)) => { subs.remove(&sub); }
                    Some(Command::Close) | None => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subscription;

    fn l2(coin: &str) -> Subscription {
        Subscription::L2Book { coin: coin.into() }
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let mut set = SubscriptionSet::new();
        assert!(set.insert(l2("ETH")));
        assert!(!set.insert(l2("ETH")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_absent_is_a_noop() {
        let mut set = SubscriptionSet::new();
        assert!(!set.remove(&l2("ETH")));
        set.insert(l2("ETH"));
        assert!(set.remove(&l2("ETH")));
        assert!(!set.remove(&l2("ETH")));
        assert!(set.is_empty());
    }

    #[test]
    fn snapshot_contains_each_entry_exactly_once() {
        let mut set = SubscriptionSet::new();
        set.insert(l2("ETH"));
        set.insert(l2("ETH"));
        set.insert(Subscription::AllMids);

        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.iter().filter(|s| **s == l2("ETH")).count(),
            1,
            "replay must send one frame per entry"
        );
        assert_eq!(
            snapshot
                .iter()
                .filter(|s| **s == Subscription::AllMids)
                .count(),
            1
        );
    }

    #[test]
    fn snapshot_is_detached() {
        let mut set = SubscriptionSet::new();
        set.insert(l2("BTC"));
        let snapshot = set.snapshot();
        set.remove(&l2("BTC"));
        assert_eq!(snapshot.len(), 1, "snapshot copies, not borrows");
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        // Dial a port that nothing listens on; the task stays in its
        // backoff loop until Close lands.
        let url: Url = "ws://127.0.0.1:9".parse().unwrap();
        let conn = Connection::connect(
            url,
            WsConfig {
                connect_timeout: Duration::from_millis(100),
                reconnect_interval: Duration::from_millis(50),
                max_reconnect_attempts: u32::MAX,
                ..WsConfig::default()
            },
        );
        let cmd = conn.commands();
        conn.shutdown().await;
        assert!(cmd.subscribe(Subscription::AllMids).is_err());
    }
}

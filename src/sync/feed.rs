//! Live change feed for one session.
//!
//! The feed is treated as an at-most-once, unordered notification channel,
//! not a durable log: there is no cursor to resume from. After every
//! reconnect the subscriber receives [`FeedSignal::Resync`] and is expected
//! to re-hydrate from the backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sync::event::{ChangeEvent, DecodeError, EntityKind, RawChange, channel_name};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<redis::RedisError> for FeedError {
    fn from(err: redis::RedisError) -> Self {
        FeedError::Transport(err.to_string())
    }
}

/// Change records of one session; the stream ending means the connection dropped.
pub type ChangeStream = BoxStream<'static, Result<RawChange, FeedError>>;

/// Source of raw change records, one connection per call.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    async fn connect(&self, session_id: Uuid) -> Result<ChangeStream, FeedError>;
}

/// Connection state reported to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    /// Retry budget exhausted. The store stays readable but stale.
    Disconnected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSignal {
    Event(ChangeEvent),
    /// The feed reconnected; events may have been missed.
    Resync,
    Status(FeedStatus),
}

/// Bounded exponential backoff between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// A connect still pending after this long counts as a failed attempt.
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base doubled per attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Handle to an open feed. Dropping it closes the feed.
#[derive(Debug)]
pub struct Subscription {
    session_id: Uuid,
    cancel: CancellationToken,
    status: watch::Receiver<FeedStatus>,
}

impl Subscription {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    pub fn status_updates(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    /// Stops delivery. Safe to call repeatedly and after the connection is gone.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(session_id = %self.session_id, "closing change feed");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Clone)]
pub struct ChangeFeedClient {
    transport: Arc<dyn FeedTransport>,
    policy: RetryPolicy,
}

impl ChangeFeedClient {
    pub fn new(transport: Arc<dyn FeedTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Opens a feed scoped to `session_id`, delivering both tasks and rewards
    /// to `on_event`. Must be called from within a tokio runtime.
    pub fn open<F>(&self, session_id: Uuid, on_event: F) -> Subscription
    where
        F: FnMut(FeedSignal) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);

        let driver = Driver {
            session_id,
            policy: self.policy,
            status: status_tx,
            cancel: cancel.clone(),
            on_event,
        };
        tokio::spawn(driver.run(self.transport.clone()));

        Subscription {
            session_id,
            cancel,
            status: status_rx,
        }
    }

    pub fn close(subscription: &Subscription) {
        subscription.close();
    }
}

struct Driver<F> {
    session_id: Uuid,
    policy: RetryPolicy,
    status: watch::Sender<FeedStatus>,
    cancel: CancellationToken,
    on_event: F,
}

impl<F> Driver<F>
where
    F: FnMut(FeedSignal) + Send + 'static,
{
    async fn run(mut self, transport: Arc<dyn FeedTransport>) {
        let cancel = self.cancel.clone();
        let mut attempt: u32 = 0;
        let mut connected_before = false;

        'feed: loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break 'feed,
                result = timeout(self.policy.connect_timeout, transport.connect(self.session_id)) => {
                    result.unwrap_or_else(|_| {
                        Err(FeedError::Transport(format!(
                            "connect timed out after {:?}",
                            self.policy.connect_timeout
                        )))
                    })
                }
            };

            match connected {
                Ok(mut stream) => {
                    info!(session_id = %self.session_id, "✅ Change feed live");
                    attempt = 0;
                    self.set_status(FeedStatus::Live);
                    if connected_before {
                        self.emit(FeedSignal::Resync);
                    }
                    connected_before = true;

                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => break 'feed,
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(raw)) => match raw.decode() {
                                Ok(event) => self.emit(FeedSignal::Event(event)),
                                Err(err) => {
                                    warn!(session_id = %self.session_id, error = %err, "skipping undecodable change")
                                }
                            },
                            Some(Err(FeedError::Decode(err))) => {
                                warn!(session_id = %self.session_id, error = %err, "skipping malformed change")
                            }
                            Some(Err(err)) => {
                                warn!(session_id = %self.session_id, error = %err, "change feed dropped");
                                break;
                            }
                            None => {
                                warn!(session_id = %self.session_id, "change feed ended");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(session_id = %self.session_id, attempt, error = %err, "change feed connect failed");
                }
            }

            attempt += 1;
            if attempt > self.policy.max_retries {
                warn!(session_id = %self.session_id, retries = self.policy.max_retries, "change feed retry budget exhausted");
                self.set_status(FeedStatus::Disconnected);
                return;
            }

            self.set_status(FeedStatus::Reconnecting { attempt });
            tokio::select! {
                _ = cancel.cancelled() => break 'feed,
                _ = tokio::time::sleep(self.policy.delay_for(attempt)) => {}
            }
        }

        self.status.send_replace(FeedStatus::Closed);
        debug!(session_id = %self.session_id, "change feed closed");
    }

    fn emit(&mut self, signal: FeedSignal) {
        if !self.cancel.is_cancelled() {
            (self.on_event)(signal);
        }
    }

    fn set_status(&mut self, status: FeedStatus) {
        self.status.send_replace(status);
        self.emit(FeedSignal::Status(status));
    }
}

/// Feed over Redis pub/sub, one channel per table.
#[derive(Clone)]
pub struct RedisFeedTransport {
    client: redis::Client,
}

impl RedisFeedTransport {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedTransport for RedisFeedTransport {
    async fn connect(&self, session_id: Uuid) -> Result<ChangeStream, FeedError> {
        let channels = vec![
            channel_name(session_id, EntityKind::Task),
            channel_name(session_id, EntityKind::Reward),
        ];

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channels).await?;

        let stream = pubsub.into_on_message().map(|msg| {
            let payload: String = msg
                .get_payload()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?;
            Ok(RawChange::from_json(&payload)?)
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{Difficulty, Task, TaskRow};
    use crate::sync::event::{Change, ChangeKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    type Feed = mpsc::UnboundedSender<Result<RawChange, FeedError>>;

    /// Hands out scripted connections; refuses once the script runs out.
    #[derive(Default)]
    struct ScriptedTransport {
        connections: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<RawChange, FeedError>>>>,
    }

    impl ScriptedTransport {
        fn push_connection(&self) -> Feed {
            let (tx, rx) = mpsc::unbounded_channel();
            self.connections.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl FeedTransport for ScriptedTransport {
        async fn connect(&self, _session_id: Uuid) -> Result<ChangeStream, FeedError> {
            let rx = self
                .connections
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| FeedError::Transport("connection refused".into()))?;
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(stream.boxed())
        }
    }

    fn insert(session_id: Uuid) -> RawChange {
        let task = Task {
            id: Uuid::new_v4(),
            session_id,
            owner_user_id: Uuid::new_v4(),
            title: "Write tests".to_string(),
            done: false,
            difficulty: Difficulty::Medium,
            revision: 1,
        };
        RawChange::task(ChangeKind::Insert, TaskRow::from(&task))
    }

    fn open(
        transport: Arc<ScriptedTransport>,
        policy: RetryPolicy,
    ) -> (Subscription, mpsc::UnboundedReceiver<FeedSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ChangeFeedClient::new(transport, policy);
        let sub = client.open(Uuid::new_v4(), move |signal| {
            let _ = tx.send(signal);
        });
        (sub, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_decoded_events_once_live() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = transport.push_connection();
        let (sub, mut signals) = open(transport, RetryPolicy::default());

        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Live)));
        feed.send(Ok(insert(sub.session_id()))).unwrap();

        match signals.recv().await {
            Some(FeedSignal::Event(ChangeEvent::Task(Change::Insert(task)))) => {
                assert_eq!(task.title, "Write tests")
            }
            other => panic!("unexpected signal: {:?}", other),
        }
        assert_eq!(sub.status(), FeedStatus::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_records_are_skipped() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = transport.push_connection();
        let (sub, mut signals) = open(transport, RetryPolicy::default());

        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Live)));
        feed.send(Err(DecodeError::Malformed("not json".into()).into())).unwrap();
        feed.send(Ok(insert(sub.session_id()))).unwrap();

        assert!(matches!(signals.recv().await, Some(FeedSignal::Event(_))));
        assert_eq!(sub.status(), FeedStatus::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_requests_resync() {
        let transport = Arc::new(ScriptedTransport::default());
        let first = transport.push_connection();
        let _second = transport.push_connection();
        let (_sub, mut signals) = open(transport, RetryPolicy::default());

        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Live)));
        drop(first);

        assert_eq!(
            signals.recv().await,
            Some(FeedSignal::Status(FeedStatus::Reconnecting { attempt: 1 }))
        );
        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Live)));
        assert_eq!(signals.recv().await, Some(FeedSignal::Resync));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_disconnected() {
        let transport = Arc::new(ScriptedTransport::default());
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let (sub, mut signals) = open(transport, policy);

        let mut seen = Vec::new();
        while let Some(signal) = signals.recv().await {
            seen.push(signal);
        }

        assert_eq!(
            seen,
            vec![
                FeedSignal::Status(FeedStatus::Reconnecting { attempt: 1 }),
                FeedSignal::Status(FeedStatus::Reconnecting { attempt: 2 }),
                FeedSignal::Status(FeedStatus::Disconnected),
            ]
        );
        assert_eq!(sub.status(), FeedStatus::Disconnected);
    }

    /// Accepts the connection but never completes it.
    struct StalledTransport;

    #[async_trait]
    impl FeedTransport for StalledTransport {
        async fn connect(&self, _session_id: Uuid) -> Result<ChangeStream, FeedError> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connect_counts_as_a_failed_attempt() {
        let policy = RetryPolicy {
            max_retries: 1,
            connect_timeout: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        let (tx, mut signals) = mpsc::unbounded_channel();
        let client = ChangeFeedClient::new(Arc::new(StalledTransport), policy);
        let sub = client.open(Uuid::new_v4(), move |signal| {
            let _ = tx.send(signal);
        });

        let started = tokio::time::Instant::now();
        assert_eq!(
            signals.recv().await,
            Some(FeedSignal::Status(FeedStatus::Reconnecting { attempt: 1 }))
        );
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Disconnected)));
        assert_eq!(signals.recv().await, None);
        assert_eq!(sub.status(), FeedStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_and_silences_delivery() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = transport.push_connection();
        let (sub, mut signals) = open(transport, RetryPolicy::default());
        assert_eq!(signals.recv().await, Some(FeedSignal::Status(FeedStatus::Live)));

        let mut updates = sub.status_updates();
        sub.close();
        ChangeFeedClient::close(&sub);
        updates.wait_for(|s| *s == FeedStatus::Closed).await.unwrap();

        let _ = feed.send(Ok(insert(sub.session_id())));
        assert_eq!(signals.recv().await, None);
        assert!(sub.is_closed());
        sub.close();
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(4), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
        assert_eq!(policy.delay_for(64), Duration::from_secs(8));
    }
}

//! In-memory queue transport for testing and local development.
//!
//! This module provides a fully functional in-process broker that:
//! - Keeps one FIFO queue per queue name with broker-style sequence numbers
//! - Implements peek-lock receive with lock expiry and redelivery
//! - Blocks receivers until a message arrives or the wait elapses
//!
//! For tests it additionally records every open/close of a scoped resource,
//! tracks acknowledged messages, and lets callers inject one-shot failures at
//! each transport step.

use crate::error::{QueueError, ValidationError};
use crate::message::{LockToken, Message, MessageId, QueueName, ReceivedMessage, Timestamp};
use crate::provider::{ConnectionString, InMemoryConfig, ProviderType};
use crate::transport::{QueueConnection, QueueReceiver, QueueSender, QueueTransport};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Longest a blocked receiver sleeps before re-checking for expired locks
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Instrumentation
// ============================================================================

/// Transport step at which a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Connect,
    OpenSender,
    OpenReceiver,
    Send,
    Receive,
    Complete,
}

impl FailurePoint {
    fn to_error(self, message: String) -> QueueError {
        match self {
            Self::Connect => QueueError::ConnectionFailed { message },
            Self::OpenSender | Self::OpenReceiver => QueueError::ProviderError {
                provider: ProviderType::InMemory.name().to_string(),
                code: "ChannelUnavailable".to_string(),
                message,
            },
            Self::Send => QueueError::SendRejected { message },
            Self::Receive => QueueError::ProviderError {
                provider: ProviderType::InMemory.name().to_string(),
                code: "ReceiveFailed".to_string(),
                message,
            },
            Self::Complete => QueueError::ProviderError {
                provider: ProviderType::InMemory.name().to_string(),
                code: "CompleteFailed".to_string(),
                message,
            },
        }
    }
}

/// Lifecycle event of a scoped transport resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    ConnectionOpened,
    ConnectionClosed,
    /// Connection released by drop without an explicit close
    ConnectionDropped,
    SenderOpened,
    SenderClosed,
    SenderDropped,
    ReceiverOpened,
    ReceiverClosed,
    ReceiverDropped,
}

/// Open/close counters derived from the resource event log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub connections_opened: usize,
    pub connections_released: usize,
    pub senders_opened: usize,
    pub senders_released: usize,
    pub receivers_opened: usize,
    pub receivers_released: usize,
}

impl ResourceStats {
    fn from_events(events: &[ResourceEvent]) -> Self {
        let mut stats = Self::default();
        for event in events {
            match event {
                ResourceEvent::ConnectionOpened => stats.connections_opened += 1,
                ResourceEvent::ConnectionClosed | ResourceEvent::ConnectionDropped => {
                    stats.connections_released += 1
                }
                ResourceEvent::SenderOpened => stats.senders_opened += 1,
                ResourceEvent::SenderClosed | ResourceEvent::SenderDropped => {
                    stats.senders_released += 1
                }
                ResourceEvent::ReceiverOpened => stats.receivers_opened += 1,
                ResourceEvent::ReceiverClosed | ResourceEvent::ReceiverDropped => {
                    stats.receivers_released += 1
                }
            }
        }
        stats
    }

    /// True when every opened resource has been released
    pub fn all_released(&self) -> bool {
        self.connections_opened == self.connections_released
            && self.senders_opened == self.senders_released
            && self.receivers_opened == self.receivers_released
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    sequence_number: i64,
    body: Bytes,
    content_type: Option<String>,
    delivery_count: u32,
}

struct LockedMessage {
    message: StoredMessage,
    lock_expires_at: Instant,
}

#[derive(Default)]
struct InMemoryQueue {
    /// Visible messages in FIFO order
    available: VecDeque<StoredMessage>,
    /// Messages held under a receive lock, keyed by lock token
    locked: HashMap<String, LockedMessage>,
    /// Messages removed by acknowledgment, in completion order
    completed: Vec<MessageId>,
    next_sequence: i64,
}

impl InMemoryQueue {
    fn enqueue(&mut self, body: Bytes, content_type: Option<String>) -> MessageId {
        self.next_sequence += 1;
        let message_id = MessageId::new();
        self.available.push_back(StoredMessage {
            message_id: message_id.clone(),
            sequence_number: self.next_sequence,
            body,
            content_type,
            delivery_count: 0,
        });
        message_id
    }

    /// Return expired locks to the visible queue, keeping sequence order
    fn reclaim_expired_locks(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.lock_expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        for token in expired {
            if let Some(locked) = self.locked.remove(&token) {
                self.available.push_back(locked.message);
            }
        }
        self.available
            .make_contiguous()
            .sort_by_key(|m| m.sequence_number);
    }
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<QueueName, InMemoryQueue>,
    failures: HashMap<FailurePoint, VecDeque<String>>,
    events: Vec<ResourceEvent>,
}

impl BrokerState {
    fn queue(&mut self, name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(name.clone()).or_default()
    }
}

struct Broker {
    state: Mutex<BrokerState>,
    arrivals: Notify,
    config: InMemoryConfig,
}

impl Broker {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: ResourceEvent) {
        self.state().events.push(event);
    }

    fn check_failure(&self, point: FailurePoint) -> Result<(), QueueError> {
        let injected = self
            .state()
            .failures
            .get_mut(&point)
            .and_then(|pending| pending.pop_front());

        match injected {
            Some(message) => Err(point.to_error(message)),
            None => Ok(()),
        }
    }

    fn lock_available(&self, queue: &QueueName, max_count: u32) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let lock_duration = self.config.lock_duration;
        let locked_until = lock_deadline(lock_duration);

        let mut state = self.state();
        let queue = state.queue(queue);
        queue.reclaim_expired_locks(now);

        let mut batch = Vec::new();
        while batch.len() < max_count as usize {
            let Some(mut message) = queue.available.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            let token = uuid::Uuid::new_v4().to_string();
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                sequence_number: message.sequence_number,
                body: message.body.clone(),
                content_type: message.content_type.clone(),
                lock_token: LockToken::new(token.clone()),
                delivery_count: message.delivery_count,
                locked_until: locked_until.clone(),
            });
            queue.locked.insert(
                token,
                LockedMessage {
                    message,
                    lock_expires_at: now + lock_duration,
                },
            );
        }
        batch
    }
}

fn lock_deadline(lock_duration: Duration) -> Timestamp {
    let delta = chrono::Duration::from_std(lock_duration)
        .unwrap_or_else(|_| chrono::Duration::days(365));
    Timestamp::from_datetime(
        Utc::now()
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-process broker. Clones share the same queues.
#[derive(Clone)]
pub struct InMemoryTransport {
    broker: Arc<Broker>,
}

impl InMemoryTransport {
    /// Create new in-memory broker with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            broker: Arc::new(Broker {
                state: Mutex::new(BrokerState::default()),
                arrivals: Notify::new(),
                config,
            }),
        }
    }

    /// Make the next call at `point` fail with `message`.
    ///
    /// Injected failures are consumed one per call, in the order added.
    pub fn fail_next(&self, point: FailurePoint, message: impl Into<String>) {
        self.broker
            .state()
            .failures
            .entry(point)
            .or_default()
            .push_back(message.into());
    }

    /// Place a raw body on a queue, bypassing any sender
    pub fn enqueue_raw(&self, queue: &QueueName, body: impl Into<Bytes>) -> MessageId {
        let id = self.broker.state().queue(queue).enqueue(body.into(), None);
        self.broker.arrivals.notify_waiters();
        id
    }

    /// Bodies of the visible messages, in delivery order
    pub fn visible_bodies(&self, queue: &QueueName) -> Vec<Bytes> {
        let mut state = self.broker.state();
        let queue = state.queue(queue);
        queue.reclaim_expired_locks(Instant::now());
        queue.available.iter().map(|m| m.body.clone()).collect()
    }

    /// Number of messages visible to the next receiver
    pub fn available_count(&self, queue: &QueueName) -> usize {
        let mut state = self.broker.state();
        let queue = state.queue(queue);
        queue.reclaim_expired_locks(Instant::now());
        queue.available.len()
    }

    /// Number of messages currently held under an unexpired lock
    pub fn locked_count(&self, queue: &QueueName) -> usize {
        let mut state = self.broker.state();
        let queue = state.queue(queue);
        queue.reclaim_expired_locks(Instant::now());
        queue.locked.len()
    }

    /// Messages acknowledged so far, in completion order
    pub fn completed(&self, queue: &QueueName) -> Vec<MessageId> {
        self.broker.state().queue(queue).completed.clone()
    }

    /// Every resource lifecycle event, in order
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.broker.state().events.clone()
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats::from_events(&self.broker.state().events)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn connect(
        &self,
        _credential: &ConnectionString,
    ) -> Result<Box<dyn QueueConnection>, QueueError> {
        self.broker.check_failure(FailurePoint::Connect)?;
        self.broker.record(ResourceEvent::ConnectionOpened);

        Ok(Box::new(InMemoryConnection {
            broker: Arc::clone(&self.broker),
            closed: AtomicBool::new(false),
        }))
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

// ============================================================================
// Scoped resources
// ============================================================================

struct InMemoryConnection {
    broker: Arc<Broker>,
    closed: AtomicBool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "connection".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QueueConnection for InMemoryConnection {
    async fn open_sender(&self, queue: &QueueName) -> Result<Box<dyn QueueSender>, QueueError> {
        self.ensure_open()?;
        self.broker.check_failure(FailurePoint::OpenSender)?;
        self.broker.record(ResourceEvent::SenderOpened);

        Ok(Box::new(InMemorySender {
            broker: Arc::clone(&self.broker),
            queue: queue.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_receiver(
        &self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueReceiver>, QueueError> {
        self.ensure_open()?;
        self.broker.check_failure(FailurePoint::OpenReceiver)?;
        self.broker.record(ResourceEvent::ReceiverOpened);

        Ok(Box::new(InMemoryReceiver {
            broker: Arc::clone(&self.broker),
            queue: queue.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::ConnectionClosed);
        }
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::ConnectionDropped);
        }
    }
}

struct InMemorySender {
    broker: Arc<Broker>,
    queue: QueueName,
    closed: AtomicBool,
}

#[async_trait]
impl QueueSender for InMemorySender {
    async fn send(&self, message: Message) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "sender".to_string(),
            });
        }
        self.broker.check_failure(FailurePoint::Send)?;

        let max_size = self.broker.config.max_message_size;
        if message.size() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.size(),
                max_size,
            });
        }

        let message_id = self
            .broker
            .state()
            .queue(&self.queue)
            .enqueue(message.body, message.content_type);
        self.broker.arrivals.notify_waiters();

        debug!(queue = %self.queue, message_id = %message_id, "Message enqueued in memory");
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::SenderClosed);
        }
        Ok(())
    }
}

impl Drop for InMemorySender {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::SenderDropped);
        }
    }
}

struct InMemoryReceiver {
    broker: Arc<Broker>,
    queue: QueueName,
    closed: AtomicBool,
}

#[async_trait]
impl QueueReceiver for InMemoryReceiver {
    async fn receive(
        &self,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "receiver".to_string(),
            });
        }
        if max_count == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_count".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        self.broker.check_failure(FailurePoint::Receive)?;

        let deadline = Instant::now() + max_wait;
        loop {
            // Registered before checking so an arrival in between is not missed
            let arrival = self.broker.arrivals.notified();

            let batch = self.broker.lock_available(&self.queue, max_count);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let _ = tokio::time::timeout((deadline - now).min(LOCK_POLL_INTERVAL), arrival).await;
        }
    }

    async fn complete(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "receiver".to_string(),
            });
        }
        self.broker.check_failure(FailurePoint::Complete)?;

        let mut state = self.broker.state();
        let queue = state.queue(&self.queue);
        queue.reclaim_expired_locks(Instant::now());

        match queue.locked.remove(message.lock_token.as_str()) {
            Some(locked) => {
                queue.completed.push(locked.message.message_id);
                Ok(())
            }
            None => Err(QueueError::LockLost {
                message_id: message.message_id.to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::ReceiverClosed);
        }
        Ok(())
    }
}

impl Drop for InMemoryReceiver {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.record(ResourceEvent::ReceiverDropped);
        }
    }
}

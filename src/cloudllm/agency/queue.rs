//! Mailbox-based message passing for the thread-pool backend (§4.6, §9).
//!
//! Only [`runner::ThreadPoolRunner`](super::runner::ThreadPoolRunner) uses this; the serial
//! backend drives agents with plain `.await` and never touches a queue. Each agent gets one
//! unbounded `tokio::sync::mpsc` mailbox; a request/response round trip is a `task` message in,
//! a `response` message correlated back out through a one-shot rendezvous slot keyed by message
//! id, mirroring `register_response_waiter`/`wait_for_response` in the agent-thread-pool design
//! this crate's concurrency model was adapted from.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::handoff::HandoffDescriptor;

/// Payload carried by a queue message.
#[derive(Debug, Clone)]
pub enum QueueMessageKind {
    Task { input: String },
    Response { result: WorkerResult },
    Shutdown,
}

/// What a worker reports back after running one agent turn to completion.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub response: String,
    pub success: bool,
    pub error: Option<String>,
    pub processing_time: Duration,
    pub pending_handoff: Option<HandoffDescriptor>,
    pub context: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: QueueMessageKind,
}

/// Error returned when a response rendezvous never completes in time.
#[derive(Debug, Clone)]
pub struct QueueTimeoutError {
    pub agent: String,
    pub message_id: String,
}

impl std::fmt::Display for QueueTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "timed out waiting for a response from '{}' to message '{}'",
            self.agent, self.message_id
        )
    }
}

impl std::error::Error for QueueTimeoutError {}

/// Registry of per-agent mailboxes plus single-shot response rendezvous slots.
///
/// FIFO within a mailbox is guaranteed by `mpsc`'s own ordering; there is no reordering or
/// priority logic here.
#[derive(Default)]
pub struct HandoffQueue {
    mailboxes: Mutex<HashMap<String, mpsc::UnboundedSender<QueueMessage>>>,
    waiters: Mutex<HashMap<String, oneshot::Sender<QueueMessage>>>,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Create a mailbox for `name`, returning the receiving half for that agent's worker loop to
    /// poll. Re-registering the same name replaces its mailbox (the old receiver is dropped).
    pub async fn register_agent(&self, name: impl Into<String>) -> mpsc::UnboundedReceiver<QueueMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.lock().await.insert(name.into(), tx);
        rx
    }

    /// Enqueue a message onto `to`'s mailbox. Silently dropped if `to` was never registered —
    /// callers that need a hard failure should check `wait_for_response`'s timeout instead,
    /// matching the source's own lenient best-effort delivery.
    pub async fn send(&self, message: QueueMessage) {
        let to = message.to.clone();
        let mailboxes = self.mailboxes.lock().await;
        if let Some(tx) = mailboxes.get(&to) {
            let _ = tx.send(message);
        } else if log::log_enabled!(log::Level::Warn) {
            log::warn!("agency::queue: send to unregistered agent '{}' dropped", to);
        }
    }

    /// Register interest in the response to `message_id` before sending the task, so the
    /// response can never arrive before anyone is listening for it.
    pub async fn register_response_waiter(&self, message_id: impl Into<String>) -> oneshot::Receiver<QueueMessage> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(message_id.into(), tx);
        rx
    }

    /// Fulfil a previously-registered waiter. A no-op if nobody is waiting (the requester may
    /// have already timed out and given up).
    pub async fn fulfil_response_waiter(&self, message_id: &str, message: QueueMessage) {
        if let Some(tx) = self.waiters.lock().await.remove(message_id) {
            let _ = tx.send(message);
        }
    }

    /// Await the response to `message_id`, bounded by `timeout`. The caller decides what a
    /// timeout means: a single-target handoff should treat it as fatal
    /// ([`super::error::AgencyError::QueueTimeout`]), a parallel branch should fold it into a
    /// failed result for that branch only (§4.6).
    pub async fn wait_for_response(
        &self,
        agent: &str,
        message_id: &str,
        rx: oneshot::Receiver<QueueMessage>,
        timeout: Duration,
    ) -> Result<QueueMessage, QueueTimeoutError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            _ => {
                self.waiters.lock().await.remove(message_id);
                Err(QueueTimeoutError {
                    agent: agent.to_string(),
                    message_id: message_id.to_string(),
                })
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let mailboxes = self.mailboxes.lock().await;
        for (name, tx) in mailboxes.iter() {
            let _ = tx.send(QueueMessage {
                id: format!("shutdown-{}", name),
                from: "agency".to_string(),
                to: name.clone(),
                kind: QueueMessageKind::Shutdown,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mailbox_delivers_in_fifo_order() {
        let queue = HandoffQueue::new();
        let mut rx = queue.register_agent("Coder").await;

        for i in 0..3 {
            queue
                .send(QueueMessage {
                    id: format!("m{}", i),
                    from: "Agency".to_string(),
                    to: "Coder".to_string(),
                    kind: QueueMessageKind::Task { input: format!("task {}", i) },
                })
                .await;
        }

        for i in 0..3 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.id, format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn response_waiter_round_trips() {
        let queue = Arc::new(HandoffQueue::new());
        let rx = queue.register_response_waiter("req-1").await;

        let q2 = queue.clone();
        tokio::spawn(async move {
            q2.fulfil_response_waiter(
                "req-1",
                QueueMessage {
                    id: "req-1".to_string(),
                    from: "Coder".to_string(),
                    to: "Agency".to_string(),
                    kind: QueueMessageKind::Response {
                        result: WorkerResult {
                            response: "done".to_string(),
                            success: true,
                            error: None,
                            processing_time: Duration::from_millis(5),
                            pending_handoff: None,
                            context: None,
                        },
                    },
                },
            )
            .await;
        });

        let result = queue
            .wait_for_response("Coder", "req-1", rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.from, "Coder");
    }

    #[tokio::test]
    async fn unfulfilled_waiter_times_out() {
        let queue = HandoffQueue::new();
        let rx = queue.register_response_waiter("req-2").await;
        let err = queue
            .wait_for_response("Coder", "req-2", rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.agent, "Coder");
    }

    #[tokio::test]
    async fn send_to_unregistered_agent_does_not_panic() {
        let queue = HandoffQueue::new();
        queue
            .send(QueueMessage {
                id: "m".to_string(),
                from: "Agency".to_string(),
                to: "Nobody".to_string(),
                kind: QueueMessageKind::Task { input: "x".to_string() },
            })
            .await;
    }
}

//! Matchmaker RPC over AMQP
//!
//! Requests go to the matchmaker's RPC queue through the default exchange,
//! carrying a correlation id and the name of an exclusive reply queue owned
//! by this client. Replies are routed back to the waiting caller by
//! correlation id.

use super::{DequeueResult, MatchmakerService, QueueResult, RpcRequest, RpcResponse};
use crate::amqp::AmqpConnection;
use crate::error::{MatchmakingError, Result};
use crate::types::Ticket;
use crate::utils::generate_correlation_id;
use amqprs::{
    channel::{
        BasicConsumeArguments, BasicPublishArguments, Channel, QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>>;

/// [`MatchmakerService`] backed by an AMQP request/reply exchange
pub struct AmqpMatchmakerClient {
    channel: Channel,
    rpc_queue: String,
    reply_queue: String,
    call_timeout: Duration,
    pending: PendingReplies,
}

impl AmqpMatchmakerClient {
    /// Open a channel, declare the reply queue and start consuming replies
    pub async fn new(
        connection: &AmqpConnection,
        rpc_queue: impl Into<String>,
        call_timeout: Duration,
    ) -> Result<Self> {
        let channel = connection.open_channel().await?;

        let declared = channel
            .queue_declare(
                QueueDeclareArguments::new("")
                    .exclusive(true)
                    .auto_delete(true)
                    .finish(),
            )
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare RPC reply queue: {}", e),
            })?;
        let (reply_queue, _, _) = declared.ok_or_else(|| MatchmakingError::AmqpConnectionFailed {
            message: "Broker did not name the RPC reply queue".to_string(),
        })?;

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let consumer_tag = format!("queue-keeper-rpc-{}", uuid::Uuid::new_v4());
        let args = BasicConsumeArguments::new(&reply_queue, &consumer_tag)
            .manual_ack(false)
            .finish();

        channel
            .basic_consume(
                ReplyConsumer {
                    pending: pending.clone(),
                },
                args,
            )
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to consume RPC replies: {}", e),
            })?;

        let rpc_queue = rpc_queue.into();
        info!(
            "Matchmaker RPC client ready (requests to '{}', replies on '{}')",
            rpc_queue, reply_queue
        );

        Ok(Self {
            channel,
            rpc_queue,
            reply_queue,
            call_timeout,
            pending,
        })
    }

    /// Number of requests still waiting for a reply
    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    pub async fn close(self) -> Result<()> {
        self.channel
            .close()
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to close RPC channel: {}", e),
            })?;
        Ok(())
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let correlation_id = generate_correlation_id();
        let payload = serde_json::to_vec(&request).map_err(|e| MatchmakingError::InternalError {
            message: format!("Failed to serialize RPC request: {}", e),
        })?;

        let slot = ReplySlot::register(&self.pending, &correlation_id)?;

        let mut properties = BasicProperties::default();
        properties
            .with_correlation_id(&correlation_id)
            .with_reply_to(&self.reply_queue)
            .with_content_type("application/json");

        let args = BasicPublishArguments::new("", &self.rpc_queue);
        if let Err(e) = self.channel.basic_publish(properties, payload, args).await {
            return Err(MatchmakingError::RpcFailed {
                message: format!("Failed to publish RPC request: {}", e),
            }
            .into());
        }

        debug!("Sent RPC request {:?} as {}", request, correlation_id);
        slot.wait(self.call_timeout).await
    }
}

/// A caller's place in the pending-reply map.
///
/// The entry is removed when the slot is dropped, so a caller that gives up
/// early (its own timeout, a dropped request future) leaves nothing behind.
struct ReplySlot {
    pending: PendingReplies,
    correlation_id: String,
    receiver: oneshot::Receiver<RpcResponse>,
}

impl ReplySlot {
    fn register(pending: &PendingReplies, correlation_id: &str) -> Result<Self> {
        let (sender, receiver) = oneshot::channel();
        pending
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("pending RPC replies"))?
            .insert(correlation_id.to_string(), sender);

        Ok(Self {
            pending: pending.clone(),
            correlation_id: correlation_id.to_string(),
            receiver,
        })
    }

    async fn wait(mut self, call_timeout: Duration) -> Result<RpcResponse> {
        match timeout(call_timeout, &mut self.receiver).await {
            Ok(Ok(RpcResponse::Error { message })) => {
                Err(MatchmakingError::RpcFailed { message }.into())
            }
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MatchmakingError::RpcFailed {
                message: "Reply channel closed before a reply arrived".to_string(),
            }
            .into()),
            Err(_) => Err(MatchmakingError::RpcTimeout {
                timeout_ms: call_timeout.as_millis() as u64,
            }
            .into()),
        }
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.correlation_id);
        }
    }
}

fn unexpected_reply(expected: &str, response: RpcResponse) -> anyhow::Error {
    MatchmakingError::RpcFailed {
        message: format!("Expected {} reply, got {:?}", expected, response),
    }
    .into()
}

#[async_trait]
impl MatchmakerService for AmqpMatchmakerClient {
    async fn get_player_queue_info(&self, player_id: &str) -> Result<Option<Ticket>> {
        let request = RpcRequest::GetPlayerQueueInfo {
            player_id: player_id.to_string(),
        };
        match self.call(request).await? {
            RpcResponse::QueueInfo { ticket } => Ok(ticket),
            other => Err(unexpected_reply("queue info", other)),
        }
    }

    async fn queue_player(&self, game_mode_id: &str, player_id: &str) -> Result<QueueResult> {
        let request = RpcRequest::QueuePlayer {
            game_mode_id: game_mode_id.to_string(),
            player_id: player_id.to_string(),
        };
        match self.call(request).await? {
            RpcResponse::Queue { result } => Ok(result),
            other => Err(unexpected_reply("queue", other)),
        }
    }

    async fn dequeue_player(&self, player_id: &str) -> Result<DequeueResult> {
        let request = RpcRequest::DequeuePlayer {
            player_id: player_id.to_string(),
        };
        match self.call(request).await? {
            RpcResponse::Dequeue { result } => Ok(result),
            other => Err(unexpected_reply("dequeue", other)),
        }
    }
}

/// Hand a reply body to whoever is waiting on `correlation_id`.
///
/// Returns `false` when the reply was dropped: no correlation id, nobody
/// waiting (the caller timed out), or an undecodable body.
fn route_reply(pending: &PendingReplies, correlation_id: Option<&str>, body: &[u8]) -> bool {
    let Some(correlation_id) = correlation_id else {
        warn!("Dropping RPC reply without a correlation id");
        return false;
    };

    let waiter = match pending.lock() {
        Ok(mut pending) => pending.remove(correlation_id),
        Err(_) => None,
    };
    let Some(waiter) = waiter else {
        debug!("Dropping late RPC reply {}", correlation_id);
        return false;
    };

    let response = match serde_json::from_slice::<RpcResponse>(body) {
        Ok(response) => response,
        Err(e) => RpcResponse::Error {
            message: format!("Undecodable RPC reply: {}", e),
        },
    };

    waiter.send(response).is_ok()
}

struct ReplyConsumer {
    pending: PendingReplies,
}

#[async_trait]
impl AsyncConsumer for ReplyConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        _deliver: Deliver,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let correlation_id = basic_properties.correlation_id().map(|id| id.to_string());
        route_reply(&self.pending, correlation_id.as_deref(), &content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with(id: &str) -> (PendingReplies, oneshot::Receiver<RpcResponse>) {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = oneshot::channel();
        pending.lock().unwrap().insert(id.to_string(), sender);
        (pending, receiver)
    }

    #[tokio::test]
    async fn test_reply_reaches_waiting_caller() {
        let (pending, receiver) = pending_with("c1");
        let body = serde_json::to_vec(&RpcResponse::Queue {
            result: QueueResult::Success,
        })
        .unwrap();

        assert!(route_reply(&pending, Some("c1"), &body));
        assert_eq!(
            receiver.await.unwrap(),
            RpcResponse::Queue {
                result: QueueResult::Success
            }
        );
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unmatched_replies_are_dropped() {
        let (pending, _receiver) = pending_with("c1");

        assert!(!route_reply(&pending, None, b"{}"));
        assert!(!route_reply(&pending, Some("other"), b"{}"));
        assert_eq!(pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_garbled_reply_becomes_error() {
        let (pending, receiver) = pending_with("c1");

        assert!(route_reply(&pending, Some("c1"), b"not json"));
        assert!(matches!(
            receiver.await.unwrap(),
            RpcResponse::Error { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_leaves_no_pending_reply() {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let slot = ReplySlot::register(&pending, "c1").unwrap();
        assert_eq!(pending.lock().unwrap().len(), 1);

        // The caller's own deadline fires before the slot's
        let outer = timeout(Duration::from_secs(1), slot.wait(Duration::from_secs(5))).await;
        assert!(outer.is_err());
        assert!(pending.lock().unwrap().is_empty());

        // A reply arriving afterwards has nobody to go to
        assert!(!route_reply(&pending, Some("c1"), b"{}"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_leaves_no_pending_reply() {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let slot = ReplySlot::register(&pending, "c1").unwrap();

        let err = slot.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::RpcTimeout { timeout_ms: 50 })
        ));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slot_receives_routed_reply() {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let slot = ReplySlot::register(&pending, "c1").unwrap();
        let body = serde_json::to_vec(&RpcResponse::Dequeue {
            result: DequeueResult::Success,
        })
        .unwrap();

        assert!(route_reply(&pending, Some("c1"), &body));
        assert_eq!(
            slot.wait(Duration::from_secs(1)).await.unwrap(),
            RpcResponse::Dequeue {
                result: DequeueResult::Success
            }
        );
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_queue_info_reply_wire_format() {
        let reply: RpcResponse =
            serde_json::from_str(r#"{"type":"queue_info","ticket":null}"#).unwrap();
        assert_eq!(reply, RpcResponse::QueueInfo { ticket: None });
    }
}

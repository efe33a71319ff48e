//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json;

/// Default exchange the matchmaker publishes its events on
pub const MATCHMAKER_EVENTS_EXCHANGE: &str = "matchmaker.events";
/// Default queue the matchmaker serves RPC requests from
pub const MATCHMAKER_RPC_QUEUE: &str = "matchmaker.rpc";

/// Routing keys for matchmaker events
pub const TICKET_CREATED_ROUTING_KEY: &str = "ticket.created";
pub const TICKET_UPDATED_ROUTING_KEY: &str = "ticket.updated";
pub const TICKET_DELETED_ROUTING_KEY: &str = "ticket.deleted";
pub const PENDING_MATCH_CREATED_ROUTING_KEY: &str = "pending_match.created";
pub const PENDING_MATCH_UPDATED_ROUTING_KEY: &str = "pending_match.updated";
pub const PENDING_MATCH_DELETED_ROUTING_KEY: &str = "pending_match.deleted";
pub const MATCH_CREATED_ROUTING_KEY: &str = "match.created";

/// Every routing key the event consumer binds
pub const EVENT_ROUTING_KEYS: [&str; 7] = [
    TICKET_CREATED_ROUTING_KEY,
    TICKET_UPDATED_ROUTING_KEY,
    TICKET_DELETED_ROUTING_KEY,
    PENDING_MATCH_CREATED_ROUTING_KEY,
    PENDING_MATCH_UPDATED_ROUTING_KEY,
    PENDING_MATCH_DELETED_ROUTING_KEY,
    MATCH_CREATED_ROUTING_KEY,
];

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: crate::utils::generate_correlation_id(),
            timestamp: crate::utils::current_timestamp(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InvalidMessage {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Routing key a matchmaker message is published under
    pub fn routing_key_for(message: &MatchmakerMessage) -> &'static str {
        match message {
            MatchmakerMessage::TicketCreated(_) => TICKET_CREATED_ROUTING_KEY,
            MatchmakerMessage::TicketUpdated(_) => TICKET_UPDATED_ROUTING_KEY,
            MatchmakerMessage::TicketDeleted(_) => TICKET_DELETED_ROUTING_KEY,
            MatchmakerMessage::PendingMatchCreated(_) => PENDING_MATCH_CREATED_ROUTING_KEY,
            MatchmakerMessage::PendingMatchUpdated(_) => PENDING_MATCH_UPDATED_ROUTING_KEY,
            MatchmakerMessage::PendingMatchDeleted(_) => PENDING_MATCH_DELETED_ROUTING_KEY,
            MatchmakerMessage::MatchCreated(_) => MATCH_CREATED_ROUTING_KEY,
        }
    }

    /// Wrap a message in an envelope and serialize it, returning its routing key
    pub fn encode_event(message: &MatchmakerMessage) -> Result<(&'static str, Vec<u8>)> {
        Self::validate(message)?;
        let routing_key = Self::routing_key_for(message);

        let bytes = match message {
            MatchmakerMessage::TicketCreated(inner) => Self::envelope_bytes(inner, routing_key)?,
            MatchmakerMessage::TicketUpdated(inner) => Self::envelope_bytes(inner, routing_key)?,
            MatchmakerMessage::TicketDeleted(inner) => Self::envelope_bytes(inner, routing_key)?,
            MatchmakerMessage::PendingMatchCreated(inner) => {
                Self::envelope_bytes(inner, routing_key)?
            }
            MatchmakerMessage::PendingMatchUpdated(inner) => {
                Self::envelope_bytes(inner, routing_key)?
            }
            MatchmakerMessage::PendingMatchDeleted(inner) => {
                Self::envelope_bytes(inner, routing_key)?
            }
            MatchmakerMessage::MatchCreated(inner) => Self::envelope_bytes(inner, routing_key)?,
        };

        Ok((routing_key, bytes))
    }

    /// Decode an event body according to the routing key it arrived with
    pub fn decode_event(routing_key: &str, bytes: &[u8]) -> Result<MatchmakerMessage> {
        let message = match routing_key {
            TICKET_CREATED_ROUTING_KEY => {
                MatchmakerMessage::TicketCreated(Self::payload(bytes)?)
            }
            TICKET_UPDATED_ROUTING_KEY => {
                MatchmakerMessage::TicketUpdated(Self::payload(bytes)?)
            }
            TICKET_DELETED_ROUTING_KEY => {
                MatchmakerMessage::TicketDeleted(Self::payload(bytes)?)
            }
            PENDING_MATCH_CREATED_ROUTING_KEY => {
                MatchmakerMessage::PendingMatchCreated(Self::payload(bytes)?)
            }
            PENDING_MATCH_UPDATED_ROUTING_KEY => {
                MatchmakerMessage::PendingMatchUpdated(Self::payload(bytes)?)
            }
            PENDING_MATCH_DELETED_ROUTING_KEY => {
                MatchmakerMessage::PendingMatchDeleted(Self::payload(bytes)?)
            }
            MATCH_CREATED_ROUTING_KEY => MatchmakerMessage::MatchCreated(Self::payload(bytes)?),
            other => {
                return Err(MatchmakingError::InvalidMessage {
                    reason: format!("Unknown routing key '{}'", other),
                }
                .into())
            }
        };

        Self::validate(&message)?;
        Ok(message)
    }

    /// Reject messages the coordinator could not act on
    pub fn validate(message: &MatchmakerMessage) -> Result<()> {
        match message {
            MatchmakerMessage::TicketCreated(inner) => Self::validate_ticket(&inner.ticket),
            MatchmakerMessage::TicketUpdated(inner) => {
                Self::validate_ticket(&inner.new_ticket)?;
                if inner.old_ticket.id != inner.new_ticket.id {
                    return Err(MatchmakingError::InvalidMessage {
                        reason: format!(
                            "Ticket update changes id from {} to {}",
                            inner.old_ticket.id, inner.new_ticket.id
                        ),
                    }
                    .into());
                }
                Ok(())
            }
            MatchmakerMessage::TicketDeleted(inner) => Self::validate_ticket(&inner.ticket),
            MatchmakerMessage::PendingMatchCreated(inner) => {
                Self::validate_pending_match(&inner.pending_match)
            }
            MatchmakerMessage::PendingMatchUpdated(inner) => {
                Self::validate_pending_match(&inner.pending_match)
            }
            MatchmakerMessage::PendingMatchDeleted(inner) => {
                Self::validate_pending_match(&inner.pending_match)
            }
            MatchmakerMessage::MatchCreated(inner) => {
                if inner.created_match.id.is_empty() {
                    return Err(MatchmakingError::InvalidMessage {
                        reason: "Match ID cannot be empty".to_string(),
                    }
                    .into());
                }
                Ok(())
            }
        }
    }

    fn validate_ticket(ticket: &Ticket) -> Result<()> {
        if ticket.id.is_empty() {
            return Err(MatchmakingError::InvalidMessage {
                reason: "Ticket ID cannot be empty".to_string(),
            }
            .into());
        }

        if ticket.player_ids.is_empty() {
            return Err(MatchmakingError::InvalidMessage {
                reason: format!("Ticket {} has no players", ticket.id),
            }
            .into());
        }

        Ok(())
    }

    fn validate_pending_match(pending_match: &PendingMatch) -> Result<()> {
        if pending_match.id.is_empty() {
            return Err(MatchmakingError::InvalidMessage {
                reason: "Pending match ID cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn payload<T: Serialize + DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(MessageEnvelope::<T>::from_bytes(bytes)?.payload)
    }

    fn envelope_bytes<T>(payload: &T, routing_key: &str) -> Result<Vec<u8>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        MessageEnvelope::new(payload.clone(), routing_key.to_string()).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str, players: &[&str]) -> Ticket {
        Ticket::new(id, "duel", players.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(
            TicketCreated {
                ticket: ticket("t1", &["a"]),
            },
            TICKET_CREATED_ROUTING_KEY.to_string(),
        );

        assert_eq!(envelope.routing_key, "ticket.created");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_decode_by_routing_key() {
        let message = MatchmakerMessage::TicketDeleted(TicketDeleted {
            ticket: ticket("t1", &["a", "b"]),
            reason: TicketDeleteReason::ManualDequeue,
        });

        let (routing_key, bytes) = MessageUtils::encode_event(&message).unwrap();
        assert_eq!(routing_key, TICKET_DELETED_ROUTING_KEY);
        assert_eq!(MessageUtils::decode_event(routing_key, &bytes).unwrap(), message);

        // Same body under the wrong key does not parse as a ticket update
        assert!(MessageUtils::decode_event(TICKET_UPDATED_ROUTING_KEY, &bytes).is_err());
    }

    #[test]
    fn test_decode_matchmaker_json() {
        let body = r#"{
            "payload": {
                "reason": "MATCH_CREATED",
                "pending_match": {
                    "id": "pm1",
                    "game_mode_id": "duel",
                    "ticket_ids": ["t1", "t2"],
                    "teleport_time": "2026-01-01T00:00:10Z"
                }
            },
            "correlation_id": "c1",
            "timestamp": "2026-01-01T00:00:00Z",
            "routing_key": "pending_match.deleted"
        }"#;

        let message =
            MessageUtils::decode_event(PENDING_MATCH_DELETED_ROUTING_KEY, body.as_bytes()).unwrap();
        match message {
            MatchmakerMessage::PendingMatchDeleted(deleted) => {
                assert_eq!(deleted.reason, PendingMatchDeleteReason::MatchCreated);
                assert_eq!(deleted.pending_match.ticket_ids, vec!["t1", "t2"]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_unknown_routing_key_rejected() {
        assert!(MessageUtils::decode_event("player.joined", b"{}").is_err());
    }

    #[test]
    fn test_validation() {
        let empty_party = MatchmakerMessage::TicketCreated(TicketCreated {
            ticket: ticket("t1", &[]),
        });
        assert!(MessageUtils::validate(&empty_party).is_err());

        let renamed = MatchmakerMessage::TicketUpdated(TicketUpdated {
            old_ticket: ticket("t1", &["a"]),
            new_ticket: ticket("t2", &["a"]),
        });
        assert!(MessageUtils::validate(&renamed).is_err());

        let valid = MatchmakerMessage::TicketUpdated(TicketUpdated {
            old_ticket: ticket("t1", &["a"]),
            new_ticket: ticket("t1", &["a", "b"]),
        });
        assert!(MessageUtils::validate(&valid).is_ok());
    }

    #[test]
    fn test_routing_keys_are_distinct() {
        let mut keys = EVENT_ROUTING_KEYS.to_vec();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), EVENT_ROUTING_KEYS.len());
    }
}

//! AMQP integration for the queue keeper
//!
//! Connection management, the matchmaker event consumer and the wire format
//! shared with the matchmaker.

pub mod connection;
pub mod consumer;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use consumer::MatchmakerEventConsumer;
pub use messages::*;
pub use publisher::{
    AmqpEventPublisher, MatchmakerEventPublisher, PublisherConfig, RecordingEventPublisher,
};

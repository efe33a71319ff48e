//! In-process delivery of matchmaker bus messages
//!
//! The AMQP consumer feeds decoded messages into the hub; the coordinator
//! subscribes to the payload types it reacts to.

pub mod hub;

pub use hub::MessagingHub;

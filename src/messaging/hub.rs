//! Typed in-process message hub
//!
//! Listeners subscribe by payload type. Transports decode wire messages into
//! [`MatchmakerMessage`] and hand them to [`MessagingHub::dispatch_message`],
//! so subscribers never see the transport.

use crate::error::{MatchmakingError, Result};
use crate::types::MatchmakerMessage;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

type Listener = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

/// Subscribe-by-type message hub
#[derive(Default)]
pub struct MessagingHub {
    listeners: RwLock<HashMap<TypeId, Vec<Listener>>>,
}

impl MessagingHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every message of type `T`
    pub fn add_listener<T, F>(&self, listener: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let erased: Listener = Arc::new(move |message: &(dyn Any + Send + Sync)| {
            if let Some(message) = message.downcast_ref::<T>() {
                listener(message);
            }
        });

        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("listeners"))?;
        listeners.entry(TypeId::of::<T>()).or_default().push(erased);

        debug!("Registered listener for {}", std::any::type_name::<T>());
        Ok(())
    }

    /// Deliver a message to every listener of its type, returning how many ran
    pub fn dispatch<T: Any + Send + Sync>(&self, message: &T) -> usize {
        // Listeners run outside the lock so they may register further listeners
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners
                .get(&TypeId::of::<T>())
                .cloned()
                .unwrap_or_default(),
            Err(_) => {
                error!(
                    "Dropping {}: listener lock poisoned",
                    std::any::type_name::<T>()
                );
                return 0;
            }
        };

        let erased: &(dyn Any + Send + Sync) = message;
        for listener in &listeners {
            listener(erased);
        }

        listeners.len()
    }

    /// Unwrap a decoded bus message and dispatch its payload
    pub fn dispatch_message(&self, message: &MatchmakerMessage) -> usize {
        match message {
            MatchmakerMessage::TicketCreated(inner) => self.dispatch(inner),
            MatchmakerMessage::TicketUpdated(inner) => self.dispatch(inner),
            MatchmakerMessage::TicketDeleted(inner) => self.dispatch(inner),
            MatchmakerMessage::PendingMatchCreated(inner) => self.dispatch(inner),
            MatchmakerMessage::PendingMatchUpdated(inner) => self.dispatch(inner),
            MatchmakerMessage::PendingMatchDeleted(inner) => self.dispatch(inner),
            MatchmakerMessage::MatchCreated(inner) => self.dispatch(inner),
        }
    }

    /// Number of listeners registered for `T`
    pub fn listener_count<T: Any>(&self) -> usize {
        self.listeners
            .read()
            .map(|listeners| listeners.get(&TypeId::of::<T>()).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

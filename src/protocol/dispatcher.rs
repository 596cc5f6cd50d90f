//! Opcode-keyed routing of inbound messages to handlers.

use crate::core::opcode::Opcode;
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Handler invoked for one opcode.
///
/// Runs on the reactor thread that completed the read, so it must not block.
/// Any `Fn(&Arc<S>, &[u8])` closure is a handler.
pub trait PacketHandler<S>: Send + Sync + 'static {
    fn handle(&self, session: &Arc<S>, payload: &[u8]);
}

impl<S, F> PacketHandler<S> for F
where
    F: Fn(&Arc<S>, &[u8]) + Send + Sync + 'static,
{
    fn handle(&self, session: &Arc<S>, payload: &[u8]) {
        self(session, payload)
    }
}

/// Opcode → handler registry with one handler per opcode.
///
/// Cloning shares the registry. Handlers are cloned out of the lock before
/// they run, so a handler may itself register handlers.
pub struct PacketDispatcher<S> {
    handlers: Arc<RwLock<HashMap<Opcode, Arc<dyn PacketHandler<S>>>>>,
}

impl<S> Clone for PacketDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S: 'static> Default for PacketDispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> PacketDispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `handler` for `opcode`, replacing any previous one.
    pub fn register_handler<H>(&self, opcode: impl Into<Opcode>, handler: H) -> Result<()>
    where
        H: PacketHandler<S>,
    {
        let opcode = opcode.into();
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        if handlers.insert(opcode, Arc::new(handler)).is_some() {
            debug!(%opcode, "Replaced packet handler");
        }
        Ok(())
    }

    /// Run the handler for `opcode`, if any.
    ///
    /// Returns `Ok(false)` when no handler is registered; the payload is dropped.
    pub fn dispatch(&self, session: &Arc<S>, opcode: Opcode, payload: &[u8]) -> Result<bool> {
        let handler = {
            let handlers = self.handlers.read().map_err(|_| {
                ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
            })?;
            handlers.get(&opcode).cloned()
        };

        match handler {
            Some(handler) => {
                handler.handle(session, payload);
                Ok(true)
            }
            None => {
                trace!(%opcode, "No handler registered, dropping payload");
                Ok(false)
            }
        }
    }

    pub fn has_handler(&self, opcode: Opcode) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&opcode))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Transport that forwards commands onto a channel.
//!
//! Used when the actual radio lives behind another thread or process (and by
//! replay/tests): whoever owns the receiving end delivers the commands and
//! feeds the radio's answers back into the monitor's event queue.

use crate::transport::types::{RadioCommand, RadioTransport, TransportError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Commands buffered before the transport starts rejecting sends.
const QUEUE_CAPACITY: usize = 10_000;

/// A transport that queues every command it is given.
pub struct QueueTransport {
    sender: Sender<RadioCommand>,
    receiver: Receiver<RadioCommand>,
    connected: Arc<AtomicBool>,
}

impl QueueTransport {
    /// Create a new, connected queue transport.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        Self {
            sender,
            receiver,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the transport as (dis)connected. A disconnected transport fails
    /// every send with [`TransportError::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Check whether sends are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get the receiver for issued commands.
    pub fn receiver(&self) -> &Receiver<RadioCommand> {
        &self.receiver
    }

    /// Try to receive a command without blocking.
    pub fn try_recv(&self) -> Option<RadioCommand> {
        self.receiver.try_recv().ok()
    }

    /// Take every command issued so far, oldest first.
    pub fn drain(&self) -> Vec<RadioCommand> {
        self.receiver.try_iter().collect()
    }
}

impl Default for QueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioTransport for QueueTransport {
    fn send(&mut self, command: RadioCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sender
            .try_send(command)
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

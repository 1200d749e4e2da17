use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::ControlMessage;

/// MessageBus carries control-surface input and pitch estimates to the
/// controller thread
pub struct MessageBus {
    sender: Sender<ControlMessage>,
    receiver: Receiver<ControlMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        MessageBus { sender, receiver }
    }

    /// Get a sender that can be cloned and passed to producers
    pub fn sender(&self) -> Sender<ControlMessage> {
        self.sender.clone()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ControlMessage> {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Hand up to `max_messages` pending messages to `handle`, in arrival order
    pub fn process_messages<F>(&self, max_messages: usize, mut handle: F) -> usize
    where
        F: FnMut(ControlMessage),
    {
        let mut count = 0;
        while count < max_messages {
            match self.receiver.try_recv() {
                Ok(msg) => {
                    count += 1;
                    handle(msg);
                },
                Err(_) => break,
            }
        }
        count
    }

    #[cfg(test)]
    pub fn send(&self, msg: ControlMessage) -> Result<(), crossbeam_channel::SendError<ControlMessage>> {
        self.sender.send(msg)
    }
}

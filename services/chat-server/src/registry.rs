//! Online registry: the dispatcher's map from user id to connected client.
//!
//! Delivery is non-blocking by contract — a full outbound queue drops the
//! frame for that recipient. Persistence, not live delivery, is the primary
//! guarantee.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One outbound payload paired with the message id it carries, so the writer
/// can flip the persisted status to Sent once the socket accepts the frame.
#[derive(Debug, Clone)]
pub struct MessageBack {
    pub payload: String,
    pub message_id: String,
}

/// Frames queued for a client's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A routed chat event; confirmed back to the store on send.
    Event(MessageBack),
    /// An informational text frame (welcome, goodbye, overload notice).
    Notice(String),
}

/// The dispatcher-side handle for one connected client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub user_id: String,
    outbound: mpsc::Sender<Outbound>,
}

impl ClientHandle {
    pub fn new(user_id: String, outbound: mpsc::Sender<Outbound>) -> Self {
        ClientHandle { user_id, outbound }
    }

    /// Non-blocking delivery; false when the queue is full or the writer is
    /// gone.
    pub fn try_deliver(&self, frame: Outbound) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id = %self.user_id, error = %err, "dropping outbound frame");
                false
            }
        }
    }
}

/// Id -> client map, mutated on connect/disconnect, read on every fan-out.
#[derive(Default)]
pub struct Online {
    clients: Mutex<HashMap<String, ClientHandle>>,
}

impl Online {
    pub fn new() -> Online {
        Online::default()
    }

    /// Inserts a client, returning any stale handle for the same id.
    pub fn insert(&self, client: ClientHandle) -> Option<ClientHandle> {
        self.clients
            .lock()
            .expect("online registry poisoned")
            .insert(client.user_id.clone(), client)
    }

    pub fn remove(&self, user_id: &str) -> Option<ClientHandle> {
        self.clients
            .lock()
            .expect("online registry poisoned")
            .remove(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.clients
            .lock()
            .expect("online registry poisoned")
            .contains_key(user_id)
    }

    /// Direct fan-out: the recipient if online, then the sender echo. Returns
    /// the number of queued deliveries.
    pub fn deliver_direct(&self, receive_id: &str, send_id: &str, back: &MessageBack) -> usize {
        let clients = self.clients.lock().expect("online registry poisoned");
        let mut delivered = 0;
        if let Some(receiver) = clients.get(receive_id) {
            if receiver.try_deliver(Outbound::Event(back.clone())) {
                delivered += 1;
            }
        }
        // The sender originated the event over a live socket, so the echo
        // normally succeeds; a race with its logout just skips it.
        if let Some(sender) = clients.get(send_id) {
            if sender.try_deliver(Outbound::Event(back.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Group fan-out: every listed member that is online, the sender included
    /// by being a member like any other.
    pub fn deliver_group(&self, member_ids: &[String], back: &MessageBack) -> usize {
        let clients = self.clients.lock().expect("online registry poisoned");
        let mut delivered = 0;
        for member in member_ids {
            if let Some(client) = clients.get(member) {
                if client.try_deliver(Outbound::Event(back.clone())) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// AV fan-out: the recipient only. Echoing call signaling back to the
    /// caller would duplicate the control frame on their end.
    pub fn deliver_av(&self, receive_id: &str, back: &MessageBack) -> usize {
        let clients = self.clients.lock().expect("online registry poisoned");
        match clients.get(receive_id) {
            Some(client) if client.try_deliver(Outbound::Event(back.clone())) => 1,
            _ => 0,
        }
    }
}

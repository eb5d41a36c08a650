//! Dispatcher: the single task that owns the online registry, consumes the
//! ingress source, and fans each chat event out to its eligible recipients.
//!
//! The dispatcher talks to the store and cache through the two traits below,
//! so the routing rules are testable against in-memory fakes with no external
//! services.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chat_protocol::{
    AvControl, AvMessage, ChatMessageRequest, GroupMessageItem, MessageItem, MessageType,
    RecipientKind, TIMESTAMP_FORMAT,
};
use chrono::{NaiveDateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cache::{CacheError, keys};
use crate::constants::{CHANNEL_SIZE, DEFAULT_AVATAR_URL, GOODBYE_NOTICE, WELCOME_NOTICE};
use crate::error::ChatError;
use crate::ids;
use crate::ingress::{IngressQueue, ReceiveError};
use crate::registry::{ClientHandle, MessageBack, Online, Outbound};
use crate::repo::{MessageRecord, MessageStatus};

/// Store operations the dispatch loop and client writers need.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn insert_message(&self, message: &MessageRecord) -> Result<(), ChatError>;
    async fn mark_message_sent(&self, message_id: &str) -> Result<(), ChatError>;
    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, ChatError>;
}

/// Cache operation the dispatch loop needs: append to a history list when the
/// key already exists, resetting its TTL. An absent key stays absent.
#[async_trait]
pub trait DispatchCache: Send + Sync {
    async fn append_history(&self, key: &str, item: &serde_json::Value)
    -> Result<(), CacheError>;
}

/// Cloneable front for the dispatcher's ports, carried in the app state.
#[derive(Clone)]
pub struct DispatcherHandle {
    pub login: mpsc::Sender<ClientHandle>,
    pub logout: mpsc::Sender<String>,
    pub ingress: Arc<dyn IngressQueue>,
    pub store: Arc<dyn DispatchStore>,
}

pub struct Dispatcher {
    online: Online,
    login_rx: mpsc::Receiver<ClientHandle>,
    logout_rx: mpsc::Receiver<String>,
    ingress: Arc<dyn IngressQueue>,
    store: Arc<dyn DispatchStore>,
    cache: Arc<dyn DispatchCache>,
}

impl Dispatcher {
    pub fn new(
        ingress: Arc<dyn IngressQueue>,
        store: Arc<dyn DispatchStore>,
        cache: Arc<dyn DispatchCache>,
    ) -> (Dispatcher, DispatcherHandle) {
        let (login_tx, login_rx) = mpsc::channel(CHANNEL_SIZE);
        let (logout_tx, logout_rx) = mpsc::channel(CHANNEL_SIZE);
        let handle = DispatcherHandle {
            login: login_tx,
            logout: logout_tx,
            ingress: ingress.clone(),
            store: store.clone(),
        };
        let dispatcher = Dispatcher {
            online: Online::new(),
            login_rx,
            logout_rx,
            ingress,
            store,
            cache,
        };
        (dispatcher, handle)
    }

    /// Runs until the ports close. A panic inside one iteration is logged and
    /// the loop restarts; it never takes the process down.
    pub async fn run(mut self) {
        loop {
            match AssertUnwindSafe(self.run_loop()).catch_unwind().await {
                Ok(()) => {
                    tracing::info!("dispatcher ports closed, stopping");
                    return;
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_owned());
                    tracing::error!(panic = %message, "dispatcher panicked, restarting loop");
                }
            }
        }
    }

    async fn run_loop(&mut self) {
        loop {
            tokio::select! {
                client = self.login_rx.recv() => match client {
                    Some(client) => self.handle_login(client),
                    None => return,
                },
                user_id = self.logout_rx.recv() => match user_id {
                    Some(user_id) => self.handle_logout(&user_id),
                    None => return,
                },
                payload = self.ingress.receive() => match payload {
                    Ok(payload) => self.handle_event(&payload).await,
                    Err(ReceiveError::Closed) => return,
                    Err(err) => tracing::error!(error = %err, "ingress receive failed"),
                },
            }
        }
    }

    fn handle_login(&self, client: ClientHandle) {
        let user_id = client.user_id.clone();
        let welcomed = client.try_deliver(Outbound::Notice(WELCOME_NOTICE.to_owned()));
        if self.online.insert(client).is_some() {
            tracing::debug!(user_id = %user_id, "replaced stale client handle");
        }
        tracing::info!(user_id = %user_id, welcomed, "client online");
    }

    fn handle_logout(&self, user_id: &str) {
        match self.online.remove(user_id) {
            Some(client) => {
                client.try_deliver(Outbound::Notice(GOODBYE_NOTICE.to_owned()));
                tracing::info!(user_id = %user_id, "client offline");
            }
            None => tracing::debug!(user_id = %user_id, "logout for unknown client"),
        }
    }

    async fn handle_event(&self, payload: &str) {
        let request: ChatMessageRequest = match serde_json::from_str(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed ingress frame");
                return;
            }
        };

        match request.kind {
            MessageType::Text | MessageType::File => self.handle_chat(&request).await,
            MessageType::AudioVideo => self.handle_av(&request).await,
            MessageType::Voice => {
                tracing::debug!(send_id = %request.send_id, "voice frame has no dispatch path, dropped");
            }
        }
    }

    /// Text and file events: always persisted, then fanned out live.
    async fn handle_chat(&self, request: &ChatMessageRequest) {
        let record = chat_record(request, Utc::now().naive_utc());
        if let Err(err) = self.store.insert_message(&record).await {
            tracing::error!(error = %err, message_id = %record.uuid, "message not persisted, not relaying");
            return;
        }

        match RecipientKind::of(&request.receive_id) {
            Some(RecipientKind::User) => {
                let item = direct_item(request, &record);
                let Some(back) = message_back(&item, &record.uuid) else {
                    return;
                };
                let delivered =
                    self.online
                        .deliver_direct(&request.receive_id, &request.send_id, &back);
                tracing::debug!(message_id = %record.uuid, delivered, "direct fan-out");
                self.append_history(
                    &keys::direct_history(&request.send_id, &request.receive_id),
                    &item,
                )
                .await;
            }
            Some(RecipientKind::Group) => {
                let members = match self.store.group_members(&request.receive_id).await {
                    Ok(members) => members,
                    Err(err) => {
                        tracing::error!(
                            error = %err,
                            group_id = %request.receive_id,
                            "member list unavailable, no live delivery"
                        );
                        return;
                    }
                };
                let item = group_item(request, &record);
                let Some(back) = message_back(&item, &record.uuid) else {
                    return;
                };
                let delivered = self.online.deliver_group(&members, &back);
                tracing::debug!(
                    message_id = %record.uuid,
                    members = members.len(),
                    delivered,
                    "group fan-out"
                );
                self.append_history(&keys::group_history(&request.receive_id), &item)
                    .await;
            }
            None => {
                tracing::warn!(receive_id = %request.receive_id, "recipient id with unknown tag, dropped");
            }
        }
    }

    /// AV signaling: proxied call-control frames are persisted, everything is
    /// relayed to the callee only. No sender echo — the caller would see its
    /// own control frame twice.
    async fn handle_av(&self, request: &ChatMessageRequest) {
        let record = av_record(request, Utc::now().naive_utc());
        let control = AvControl::parse(&request.av_payload).unwrap_or_default();
        if control.is_persisted_signal() {
            if let Err(err) = self.store.insert_message(&record).await {
                tracing::error!(error = %err, message_id = %record.uuid, "call signal not persisted, not relaying");
                return;
            }
        }

        match RecipientKind::of(&request.receive_id) {
            Some(RecipientKind::User) => {
                let item = av_item(request, &record);
                let Some(back) = message_back(&item, &record.uuid) else {
                    return;
                };
                let delivered = self.online.deliver_av(&request.receive_id, &back);
                tracing::debug!(message_id = %record.uuid, delivered, "AV relay");
            }
            _ => {
                tracing::debug!(receive_id = %request.receive_id, "AV signaling is user-to-user only, dropped");
            }
        }
    }

    async fn append_history<T: Serialize>(&self, key: &str, item: &T) {
        match serde_json::to_value(item) {
            Ok(value) => {
                if let Err(err) = self.cache.append_history(key, &value).await {
                    tracing::warn!(key, error = %err, "history cache append failed");
                }
            }
            Err(err) => tracing::warn!(error = %err, "response serialization failed"),
        }
    }
}

/// Strips any absolute URL prefix before `/static/`, so stored avatar paths
/// never embed a host. The stock default avatar is kept verbatim.
pub fn normalize_avatar(path: &str) -> String {
    if path == DEFAULT_AVATAR_URL {
        return path.to_owned();
    }
    match path.find("/static/") {
        Some(index) => path[index..].to_owned(),
        None => {
            tracing::warn!(path, "avatar path without /static/ segment kept as-is");
            path.to_owned()
        }
    }
}

fn chat_record(request: &ChatMessageRequest, created_at: NaiveDateTime) -> MessageRecord {
    let (content, url, file_size, file_type, file_name) = match request.kind {
        MessageType::File => (
            String::new(),
            request.url.clone(),
            request.file_size.clone(),
            request.file_type.clone(),
            request.file_name.clone(),
        ),
        _ => (
            request.content.clone(),
            String::new(),
            "0B".to_owned(),
            String::new(),
            String::new(),
        ),
    };
    MessageRecord {
        uuid: ids::message_id(),
        session_id: request.session_id.clone(),
        kind: request.kind,
        content,
        url,
        send_id: request.send_id.clone(),
        send_name: request.send_name.clone(),
        send_avatar: normalize_avatar(&request.send_avatar),
        receive_id: request.receive_id.clone(),
        file_size,
        file_type,
        file_name,
        status: MessageStatus::Unsent,
        av_payload: String::new(),
        created_at,
    }
}

fn av_record(request: &ChatMessageRequest, created_at: NaiveDateTime) -> MessageRecord {
    MessageRecord {
        uuid: ids::message_id(),
        session_id: request.session_id.clone(),
        kind: request.kind,
        content: String::new(),
        url: String::new(),
        send_id: request.send_id.clone(),
        send_name: request.send_name.clone(),
        send_avatar: normalize_avatar(&request.send_avatar),
        receive_id: request.receive_id.clone(),
        file_size: String::new(),
        file_type: String::new(),
        file_name: String::new(),
        status: MessageStatus::Unsent,
        av_payload: request.av_payload.clone(),
        created_at,
    }
}

// Egress for live chat frames keeps the avatar exactly as the client sent it;
// only the stored row is normalized.
fn direct_item(request: &ChatMessageRequest, record: &MessageRecord) -> MessageItem {
    MessageItem {
        send_id: record.send_id.clone(),
        send_name: record.send_name.clone(),
        send_avatar: request.send_avatar.clone(),
        receive_id: record.receive_id.clone(),
        kind: record.kind,
        content: record.content.clone(),
        url: record.url.clone(),
        file_size: record.file_size.clone(),
        file_name: record.file_name.clone(),
        file_type: record.file_type.clone(),
        created_at: record.created_at.format(TIMESTAMP_FORMAT).to_string(),
    }
}

fn group_item(request: &ChatMessageRequest, record: &MessageRecord) -> GroupMessageItem {
    GroupMessageItem {
        send_id: record.send_id.clone(),
        send_name: record.send_name.clone(),
        send_avatar: request.send_avatar.clone(),
        receive_id: record.receive_id.clone(),
        kind: record.kind,
        content: record.content.clone(),
        url: record.url.clone(),
        file_size: record.file_size.clone(),
        file_name: record.file_name.clone(),
        file_type: record.file_type.clone(),
        created_at: record.created_at.format(TIMESTAMP_FORMAT).to_string(),
    }
}

fn av_item(_request: &ChatMessageRequest, record: &MessageRecord) -> AvMessage {
    AvMessage {
        send_id: record.send_id.clone(),
        send_name: record.send_name.clone(),
        send_avatar: record.send_avatar.clone(),
        receive_id: record.receive_id.clone(),
        kind: record.kind,
        content: record.content.clone(),
        url: record.url.clone(),
        file_size: record.file_size.clone(),
        file_name: record.file_name.clone(),
        file_type: record.file_type.clone(),
        created_at: record.created_at.format(TIMESTAMP_FORMAT).to_string(),
        av_payload: record.av_payload.clone(),
    }
}

fn message_back<T: Serialize>(item: &T, message_id: &str) -> Option<MessageBack> {
    match serde_json::to_string(item) {
        Ok(payload) => Some(MessageBack {
            payload,
            message_id: message_id.to_owned(),
        }),
        Err(err) => {
            tracing::error!(error = %err, "response serialization failed");
            None
        }
    }
}

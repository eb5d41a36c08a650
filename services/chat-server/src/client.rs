//! Per-connection client: a reader task feeding the ingress queue and a
//! writer task draining the outbound queue, joined by the dispatcher's
//! Login/Logout ports.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chat_protocol::ChatMessageRequest;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::constants::{CHANNEL_SIZE, OVERLOAD_NOTICE};
use crate::dispatch::DispatchStore;
use crate::ingress::{IngressQueue, SubmitError};
use crate::registry::{ClientHandle, Outbound};
use crate::state::AppState;

/// Runs one client session to completion. Entered from the upgrade handler;
/// returns when the socket dies in either direction.
pub async fn run(socket: WebSocket, user_id: String, state: AppState) {
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_SIZE);

    let handle = ClientHandle::new(user_id.clone(), outbound_tx.clone());
    if state.dispatcher.login.send(handle).await.is_err() {
        tracing::error!(user_id = %user_id, "dispatcher unavailable, dropping connection");
        return;
    }

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(
        sink,
        outbound_rx,
        state.dispatcher.store.clone(),
        user_id.clone(),
    ));

    read_loop(stream, &user_id, state.dispatcher.ingress.as_ref(), &outbound_tx).await;

    // Reader is done: tell the dispatcher, then let the writer drain and stop.
    let _ = state.dispatcher.logout.send(user_id.clone()).await;
    drop(outbound_tx);
    let _ = writer.await;
    tracing::info!(user_id = %user_id, "client session ended");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    user_id: &str,
    ingress: &dyn IngressQueue,
    outbound: &mpsc::Sender<Outbound>,
) {
    let mut local = VecDeque::new();
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => {
                tracing::info!(user_id, "client closed the socket");
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "socket read failed");
                return;
            }
        };

        // Malformed frames are logged and skipped; the connection survives.
        if let Err(err) = serde_json::from_str::<ChatMessageRequest>(&text) {
            tracing::warn!(user_id, error = %err, "skipping malformed frame");
            continue;
        }

        if admit(ingress, &mut local, CHANNEL_SIZE, text).await == Admission::Dropped {
            let _ = outbound.try_send(Outbound::Notice(OVERLOAD_NOTICE.to_owned()));
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Entered the shared ingress directly.
    Accepted,
    /// Parked in the client's local buffer until the ingress drains.
    Buffered,
    /// Both buffers full; the caller owes the client an overload notice.
    Dropped,
    /// Submission failed for a non-capacity reason; already logged.
    Failed,
}

/// Channel-mode admission: buffered frames go first so per-sender FIFO order
/// holds, then the new frame, then the local buffer, then drop-with-notice.
/// Never blocks — the dispatcher must not wait on any single reader.
pub(crate) async fn admit(
    ingress: &dyn IngressQueue,
    local: &mut VecDeque<String>,
    local_capacity: usize,
    payload: String,
) -> Admission {
    while let Some(front) = local.front() {
        match ingress.submit(front.clone()).await {
            Ok(()) => {
                local.pop_front();
            }
            Err(SubmitError::Full) => break,
            Err(err) => {
                tracing::error!(error = %err, "ingress submit failed");
                return Admission::Failed;
            }
        }
    }

    if local.is_empty() {
        match ingress.submit(payload.clone()).await {
            Ok(()) => return Admission::Accepted,
            Err(SubmitError::Full) => {}
            Err(err) => {
                tracing::error!(error = %err, "ingress submit failed");
                return Admission::Failed;
            }
        }
    }

    if local.len() < local_capacity {
        local.push_back(payload);
        Admission::Buffered
    } else {
        Admission::Dropped
    }
}

/// Drains the outbound queue onto the socket. Each successfully written chat
/// frame flips its message to Sent; a write failure ends the task.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    store: Arc<dyn DispatchStore>,
    user_id: String,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Notice(text) => {
                if let Err(err) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(user_id = %user_id, error = %err, "socket write failed");
                    return;
                }
            }
            Outbound::Event(back) => {
                if let Err(err) = sink.send(Message::Text(back.payload.into())).await {
                    tracing::warn!(user_id = %user_id, error = %err, "socket write failed");
                    return;
                }
                if let Err(err) = store.mark_message_sent(&back.message_id).await {
                    tracing::error!(
                        message_id = %back.message_id,
                        error = %err,
                        "failed to mark message sent"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::ingress::ChannelQueue;
    use crate::registry::MessageBack;
    use crate::repo::MessageRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[tokio::test]
    async fn admission_degrades_from_accept_to_buffer_to_drop() {
        let ingress = ChannelQueue::new(1);
        let mut local = VecDeque::new();

        assert_eq!(
            admit(&ingress, &mut local, 1, "one".to_owned()).await,
            Admission::Accepted
        );
        assert_eq!(
            admit(&ingress, &mut local, 1, "two".to_owned()).await,
            Admission::Buffered
        );
        assert_eq!(
            admit(&ingress, &mut local, 1, "three".to_owned()).await,
            Admission::Dropped
        );
    }

    #[tokio::test]
    async fn buffered_frames_drain_ahead_of_new_ones() {
        let ingress = ChannelQueue::new(1);
        let mut local = VecDeque::new();

        admit(&ingress, &mut local, 4, "one".to_owned()).await;
        admit(&ingress, &mut local, 4, "two".to_owned()).await;
        assert_eq!(local.len(), 1);

        // The dispatcher consumes "one"; the next admission must push "two"
        // through before "three" to keep the sender's order.
        assert_eq!(ingress.receive().await.unwrap(), "one");
        assert_eq!(
            admit(&ingress, &mut local, 4, "three".to_owned()).await,
            Admission::Buffered
        );
        assert_eq!(ingress.receive().await.unwrap(), "two");
        assert_eq!(ingress.receive().await.unwrap(), "three");
        assert!(local.is_empty());
    }

    #[derive(Default)]
    struct RecordingStore {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DispatchStore for RecordingStore {
        async fn insert_message(&self, _message: &MessageRecord) -> Result<(), ChatError> {
            Ok(())
        }

        async fn mark_message_sent(&self, message_id: &str) -> Result<(), ChatError> {
            self.sent.lock().unwrap().push(message_id.to_owned());
            Ok(())
        }

        async fn group_members(&self, _group_id: &str) -> Result<Vec<String>, ChatError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn writer_marks_events_sent_but_not_notices() {
        let (sink, mut frames) = futures::channel::mpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(8);
        let store = Arc::new(RecordingStore::default());

        tx.send(Outbound::Notice("hello".to_owned())).await.unwrap();
        tx.send(Outbound::Event(MessageBack {
            payload: "{\"content\":\"hi\"}".to_owned(),
            message_id: "M123".to_owned(),
        }))
        .await
        .unwrap();
        drop(tx);

        write_loop(sink, rx, store.clone(), "U001".to_owned()).await;

        let first = frames.try_next().unwrap().unwrap();
        assert!(matches!(first, Message::Text(text) if text.as_str() == "hello"));
        let second = frames.try_next().unwrap().unwrap();
        assert!(matches!(second, Message::Text(text) if text.as_str().contains("hi")));

        assert_eq!(*store.sent.lock().unwrap(), vec!["M123".to_owned()]);
    }
}

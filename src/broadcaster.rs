//! Per-subscriber streaming of the event feed: replay the backlog after the
//! resume token, then tail the log on the broadcast wakeup signal. Every
//! subscriber is an independent cursor; the log is append-only, so nobody
//! can miss or reorder events.

use crate::state::FeedState;
use actix_web::web::Bytes;
use actix_web::Error;
use futures::Stream;
use log::info;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

/// How long a live-tail wait blocks before re-checking the log anyway.
const WAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle time after which a blank keepalive line is sent.
const KEEPALIVE_AFTER: Duration = Duration::from_secs(120);

/// Spawn the generation task for one subscriber and hand back the stream
/// the response body reads from. The caller has already validated
/// `since_token`.
pub fn spawn_client(
    state: Arc<Mutex<FeedState>>,
    notify: broadcast::Receiver<()>,
    since_token: Option<String>,
    peer: String,
) -> Client {
    let (tx, rx) = channel(100);
    actix_web::rt::spawn(stream_events(state, notify, since_token, peer, tx));
    Client(rx)
}

async fn stream_events(
    state: Arc<Mutex<FeedState>>,
    mut notify: broadcast::Receiver<()>,
    since_token: Option<String>,
    peer: String,
    tx: Sender<Bytes>,
) {
    info!(
        "event feed client connected: {} (since_token={:?})",
        peer, since_token
    );

    let (backlog, mut last_token) = {
        let state = state.lock().await;
        let backlog = state
            .events_since(since_token.as_deref())
            .unwrap_or_default();
        (backlog, state.last_token())
    };
    for event in &backlog {
        if !send_event(&tx, event).await {
            info!("event feed client disconnected: {}", peer);
            return;
        }
    }

    let mut last_sent = Instant::now();
    loop {
        // sender gone means the process is shutting down
        if let Ok(Err(broadcast::error::RecvError::Closed)) =
            timeout(WAKE_TIMEOUT, notify.recv()).await
        {
            break;
        }

        let new_events = {
            let state = state.lock().await;
            state.events_since(last_token.as_deref()).unwrap_or_default()
        };

        if !new_events.is_empty() {
            let mut disconnected = false;
            for event in &new_events {
                if !send_event(&tx, event).await {
                    disconnected = true;
                    break;
                }
                last_token = Some(event.token.clone());
            }
            if disconnected {
                break;
            }
            last_sent = Instant::now();
        } else if last_sent.elapsed() >= KEEPALIVE_AFTER {
            if tx.send(Bytes::from_static(b"\n")).await.is_err() {
                break;
            }
            last_sent = Instant::now();
        }
    }

    info!("event feed client disconnected: {}", peer);
}

async fn send_event(tx: &Sender<Bytes>, event: &crate::models::Event) -> bool {
    let mut line = serde_json::to_vec(event).expect("feed events serialize to JSON");
    line.push(b'\n');
    tx.send(Bytes::from(line)).await.is_ok()
}

// wrap Receiver in own type, with correct error type
pub struct Client(Receiver<Bytes>);

impl Stream for Client {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.0.poll_recv(cx) {
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(v)) => Poll::Ready(Some(Ok(v))),
            Poll::Pending => Poll::Pending,
        }
    }
}

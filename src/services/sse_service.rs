use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::error::RecvError,
    mpsc::{self, Sender},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::sse::ServerEvent,
    services::session_runtime::{SessionEvent, SessionHandle},
};

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

async fn forward(
    tx: &Sender<Result<Event, Infallible>>,
    frame: serde_json::Result<ServerEvent>,
) -> bool {
    match frame {
        Ok(frame) => tx.send(Ok(to_event(frame))).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "failed to encode session event");
            true
        }
    }
}

/// Stream a viewer runtime's events as SSE. The runtime is torn down when the client
/// disconnects or the session ends.
pub fn to_sse_stream(handle: SessionHandle) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let mut receiver = handle.subscribe_events();

    tokio::spawn(async move {
        let code = handle.code();
        let connected = match handle.replica() {
            Some(state) => forward(&tx, ServerEvent::snapshot(&state)).await,
            None => false,
        };

        while connected {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => match recv_result {
                    Ok(event) => {
                        let ended = event == SessionEvent::SessionEnded;
                        if !forward(&tx, ServerEvent::from_session_event(&event)).await || ended {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        // Resync with the latest replica instead of replaying stale frames.
                        warn!(%code, skipped, "SSE client lagged behind");
                        let resent = match handle.replica() {
                            Some(state) => forward(&tx, ServerEvent::snapshot(&state)).await,
                            None => true,
                        };
                        if !resent {
                            break;
                        }
                    }
                },
            }
        }

        handle.unsubscribe().await;
        info!(%code, "session SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

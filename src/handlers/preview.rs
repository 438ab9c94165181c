use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    models::{SendMessage, SessionQuery},
    session::{Session, Subscription},
    utils::ScopeGuard,
    views, AppState,
};

/// Preview page for a session, or its live-update stream when the request
/// is a WebSocket upgrade. Without an id, lists the previewed files.
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        if ws.is_some() {
            return (StatusCode::BAD_REQUEST, "Missing session id").into_response();
        }
        let sessions = state.registry.list().await;
        return views::index_page(&sessions).into_response();
    };

    let Some(session) = state.registry.lookup(&id).await else {
        warn!("Preview requested for unknown session '{}'", id);
        return (StatusCode::NOT_FOUND, views::not_found_page(&id)).into_response();
    };

    match ws {
        Some(ws) => {
            info!("New live preview connection for session '{}'", id);
            ws.on_upgrade(move |socket| handle_socket(socket, session))
        }
        None => views::preview_page(
            session.id(),
            &session.path().display().to_string(),
            session.last_rendered().as_deref(),
        )
        .into_response(),
    }
}

fn encode(message: &SendMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to encode live update: {}", e);
            None
        }
    }
}

/// Handle a live-update connection until the browser leaves or the session closes
async fn handle_socket(mut socket: WebSocket, session: Arc<Session>) {
    let Some(Subscription {
        id: subscriber,
        mut receiver,
    }) = session.subscribe()
    else {
        // Removed between lookup and upgrade
        if let Some(message) = encode(&SendMessage::closed("session removed")) {
            let _ = socket.send(message).await;
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let guard_session = session.clone();
    let _guard = ScopeGuard::new(move || guard_session.unsubscribe(subscriber));

    info!(
        "Live preview connection established for session '{}' with subscriber '{}'",
        session.id(),
        subscriber
    );
    let (mut sender, mut incoming) = socket.split();

    // Forward pushes to the browser in the order they were published
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let closing = message.is_closed();
            let Some(frame) = encode(&message) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                break;
            }
            if closing {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // The browser sends nothing of interest; read until it goes away
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if let Message::Close(_) = message {
                break;
            }
            debug!("Ignoring client frame");
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!(
        "Live preview connection terminated for session '{}'",
        session.id()
    );
}

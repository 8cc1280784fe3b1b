//! WebSocket handler
//!
//! One task reads and drives the state machine; a writer task owns the sink
//! and the connection's compression stream.

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection::{Connection, Outbound, SessionState};
use crate::handlers::{teardown, Disconnect, MessageDispatcher};
use crate::protocol::codec::{self, WireFrame, ZlibStream};
use crate::protocol::{CloseCode, Compression, ConnectParams, ConnectQuery, GatewayMessage, NegotiationError};
use crate::server::GatewayState;

/// How long the writer may take to flush after the reader is done
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        match query.negotiate() {
            Ok(params) => handle_socket(state, socket, params).await,
            Err(err) => reject(socket, err).await,
        }
    })
}

/// Refuse the connect parameters before any state is allocated
async fn reject(mut socket: WebSocket, err: NegotiationError) {
    tracing::debug!(reason = %err, "Rejecting connect parameters");
    let frame = CloseFrame {
        code: CloseCode::Normal.as_u16(),
        reason: err.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket, params: ConnectParams) {
    let gateway = state.gateway_config();
    let (tx, rx) = mpsc::channel::<Outbound>(gateway.outbound_buffer);
    let (ws_sink, mut ws_stream) = socket.split();
    let writer = tokio::spawn(write_loop(ws_sink, rx, params.compression));

    let mut connection = Connection::new(params, tx, gateway.heartbeat_timeout());

    tracing::info!(
        version = params.version,
        encoding = params.encoding.as_str(),
        compress = ?params.compression,
        "WebSocket connection established"
    );

    if connection.send(&GatewayMessage::hello(&state.hello())).await.is_err() {
        tracing::warn!("Failed to send Hello message");
        writer.abort();
        return;
    }

    let disconnect = read_loop(&state, &mut connection, &mut ws_stream).await;

    teardown::teardown(&state, &mut connection, disconnect).await;
    if let Disconnect::Server(code) = disconnect {
        connection.close(code, code.description()).await;
    }
    connection.set_state(SessionState::Closed);

    // Dropping the last sender lets the writer drain and close the sink
    drop(connection);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!("Writer did not drain in time");
    }
}

/// Read frames until the connection has to end
async fn read_loop(
    state: &GatewayState,
    connection: &mut Connection,
    stream: &mut SplitStream<WebSocket>,
) -> Disconnect {
    loop {
        let session = connection.session().cloned();
        let close_requested = async move {
            match session {
                Some(session) => session.close_requested().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(Message::Text(text))) => WireFrame::Text(text),
                    Some(Ok(Message::Binary(bytes))) => WireFrame::Binary(bytes),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| f.code);
                        tracing::info!(close_code = ?code, "Client closed connection");
                        return Disconnect::Client(code);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        return Disconnect::Transport;
                    }
                    None => return Disconnect::Transport,
                };
                if let Some(code) = handle_frame(state, connection, &frame).await {
                    return Disconnect::Server(code);
                }
            }
            () = tokio::time::sleep_until(connection.deadline()) => {
                let session = connection.session();
                tracing::info!(
                    session_id = ?session.map(|s| s.id().to_string()),
                    since_ack_ms = ?session.map(|s| s.since_heartbeat_ack().as_millis()),
                    "Connection timed out (no heartbeat)"
                );
                return Disconnect::Server(CloseCode::SessionTimeout);
            }
            code = close_requested => {
                tracing::debug!(close_code = %code, "Close requested by dispatcher");
                return Disconnect::Server(code);
            }
        }
    }
}

/// Decode and route one frame. `Some(code)` ends the connection.
async fn handle_frame(
    state: &GatewayState,
    connection: &mut Connection,
    frame: &WireFrame,
) -> Option<CloseCode> {
    let message = match codec::decode(frame, connection.params().encoding) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode frame");
            return Some(MessageDispatcher::decode_failure(connection.state(), &e));
        }
    };

    tracing::trace!(op = %message.op, "Received message");

    match MessageDispatcher::dispatch(state, connection, message).await {
        Ok(close_code) => close_code,
        Err(e) => {
            tracing::debug!(error = %e, "Handler error");
            Some(e.to_close_code())
        }
    }
}

/// Write queued frames, compressing them if negotiated, until the queue
/// closes or a close frame goes out
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    compression: Compression,
) {
    let mut zlib = (compression == Compression::ZlibStream).then(ZlibStream::new);

    while let Some(outbound) = rx.recv().await {
        let frames = match outbound {
            Outbound::Frame(frame) => vec![frame],
            Outbound::Batch(frames) => frames,
            Outbound::Close(code, reason) => {
                let frame = CloseFrame {
                    code: code.as_u16(),
                    reason: reason.into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        };

        for frame in frames {
            let message = match (&mut zlib, frame) {
                (Some(stream), frame) => match stream.compress(frame.as_bytes()) {
                    Ok(bytes) => Message::Binary(bytes),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to compress frame");
                        return;
                    }
                },
                (None, WireFrame::Text(text)) => Message::Text(text),
                (None, WireFrame::Binary(bytes)) => Message::Binary(bytes),
            };
            if sink.send(message).await.is_err() {
                tracing::debug!("Failed to send message to WebSocket");
                return;
            }
        }
    }

    let _ = sink.close().await;
}

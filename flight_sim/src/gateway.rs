use apogee_core::{Alert, CommandSender, FlightError, GatewayPush, TelemetryFeed, TelemetrySnapshot};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub commands: CommandSender,
    pub feed: TelemetryFeed,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/status", get(status_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn status_handler(State(state): State<AppState>) -> Json<GatewayPush> {
    Json(GatewayPush::from(&state.feed.current()))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub fn push_message(snapshot: &TelemetrySnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&GatewayPush::from(snapshot))
}

pub fn alert_message(alert: &Alert) -> Result<String, serde_json::Error> {
    serde_json::to_string(alert)
}

/// Queues one text frame as a command. Bad frames are dropped here.
pub fn handle_command(commands: &CommandSender, payload: &str) {
    match commands.submit_payload(payload) {
        Ok(request) => info!("Gateway queued {} command", request),
        Err(FlightError::Protocol { .. }) => {}
        Err(e) => warn!("Gateway could not queue command: {}", e),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Client connected");
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = state.feed.watch();
    let mut alerts = state.feed.alerts();

    // State on connect, before any change happens
    let initial = snapshots.borrow_and_update().clone();
    if send_json(&mut sender, push_message(&initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if send_json(&mut sender, push_message(&snapshot)).await.is_err() {
                    break;
                }
            }
            alert = alerts.recv() => match alert {
                Ok(alert) => {
                    if send_json(&mut sender, alert_message(&alert)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Client missed {} alerts", skipped),
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_command(&state.commands, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }
    info!("Client disconnected");
}

async fn send_json<S>(sender: &mut S, json: Result<String, serde_json::Error>) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = json.map_err(|e| warn!("Cannot encode push: {}", e))?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apogee_core::{command_channel, CommandRequest, FlightPhase, TelemetryHub};

    #[test]
    fn test_push_message_fields() -> Result<(), serde_json::Error> {
        let snapshot = TelemetrySnapshot {
            phase: FlightPhase::Armed,
            flight_active: true,
            ..TelemetrySnapshot::default()
        };
        let json: serde_json::Value = serde_json::from_str(&push_message(&snapshot)?)?;
        assert_eq!(json["flight_active"], true);
        assert_eq!(json["apogee"], "0.00");
        assert_eq!(json["phase"], "Armed");
        Ok(())
    }

    #[test]
    fn test_alert_message_is_tagged() -> Result<(), serde_json::Error> {
        let json: serde_json::Value =
            serde_json::from_str(&alert_message(&Alert::DegradedTelemetry { consecutive_faults: 3 })?)?;
        assert_eq!(json["alert"], "degraded_telemetry");
        assert_eq!(json["consecutive_faults"], 3);
        Ok(())
    }

    #[test]
    fn test_text_frames_become_commands() {
        let (commands, mut queue) = command_channel(4);
        handle_command(&commands, "arm");
        handle_command(&commands, "selfdestruct");
        handle_command(&commands, r#"{"command":"disarm"}"#);

        assert_eq!(queue.next(), Some(CommandRequest::Arm));
        assert_eq!(queue.next(), Some(CommandRequest::Disarm));
        assert_eq!(queue.next(), None);
    }

    #[tokio::test]
    async fn test_status_route() {
        let (commands, _queue) = command_channel(1);
        let hub = TelemetryHub::new(4);
        let state = AppState {
            commands,
            feed: hub.feed(),
        };
        let Json(push) = status_handler(State(state)).await;
        assert!(!push.flight_active);
        assert_eq!(push.phase, FlightPhase::Idle);
    }
}

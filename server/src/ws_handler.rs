use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use common::log;

use crate::messages::SpectatorMessage;
use crate::web_server::WebServerState;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<WebServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

pub async fn handle_websocket(socket: WebSocket, state: WebServerState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    serve_spectator(&mut ws_sender, &mut ws_receiver, &state).await;
}

/// Streams snapshots to one push spectator until either side goes away.
/// Returns why the connection ended; the registration is gone by then.
pub(crate) async fn serve_spectator<S, R, E>(sender: &mut S, receiver: &mut R, state: &WebServerState) -> String
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let send_timeout = state.spectator_send_timeout;
    let idle_timeout = state.spectator_idle_timeout;

    let mut channel = state.broadcaster.register_push();
    let observer_id = channel.id();
    log!("Spectator connected: {}", observer_id);

    let hello = SpectatorMessage::Hello {
        observer_id,
        mode: state.mode.current(),
    };

    let heartbeat_period = (idle_timeout / 2).max(MIN_HEARTBEAT_INTERVAL);
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    let reason = match send_json(sender, &hello, send_timeout).await {
        Err(e) => e,
        Ok(()) => loop {
            tokio::select! {
                snapshot = channel.recv() => {
                    match snapshot {
                        Some(snapshot) => {
                            let frame = SpectatorMessage::snapshot(&snapshot);
                            if let Err(e) = send_json(sender, &frame, send_timeout).await {
                                break e;
                            }
                        }
                        None => {
                            let _ = send_frame(sender, Message::Close(None), send_timeout).await;
                            break "server shutting down".to_string();
                        }
                    }
                }
                message = receiver.next() => {
                    match message {
                        Some(Ok(Message::Close(_))) | None => break "closed by client".to_string(),
                        Some(Ok(_)) => last_seen = Instant::now(),
                        Some(Err(e)) => break format!("socket error: {}", e),
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= idle_timeout {
                        break "idle timeout".to_string();
                    }
                    if let Err(e) = send_frame(sender, Message::Ping(Bytes::new()), send_timeout).await {
                        break e;
                    }
                }
            }
        },
    };

    let dropped = channel.dropped_count();
    channel.close();
    log!(
        "Spectator {} disconnected: {} (dropped {} snapshots)",
        observer_id,
        reason,
        dropped
    );
    reason
}

async fn send_json<S>(sender: &mut S, message: &SpectatorMessage<'_>, send_timeout: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = message.to_json()?;
    send_frame(sender, Message::Text(json.into()), send_timeout).await
}

/// A spectator that cannot take a frame within `send_timeout` is treated
/// as gone.
async fn send_frame<S>(sender: &mut S, message: Message, send_timeout: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(send_timeout, sender.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("send failed: {}", e)),
        Err(_) => Err("send timed out".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    use crate::game_clock::ClockCommand;
    use crate::web_server::test_support::test_state;

    type ClientFrames = mpsc::UnboundedSender<Result<Message, String>>;

    fn frame_json(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    async fn next_text_frame(frames: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        loop {
            match frames.next().await.unwrap() {
                Message::Ping(_) => continue,
                message => return frame_json(message),
            }
        }
    }

    fn client_pair() -> (ClientFrames, mpsc::UnboundedReceiver<Result<Message, String>>) {
        mpsc::unbounded()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_then_snapshots_in_order() {
        let (state, mut clock) = test_state();
        let (mut to_client, mut client_frames) = mpsc::unbounded::<Message>();
        let (client_tx, mut from_client) = client_pair();

        let served = state.clone();
        let task = tokio::spawn(async move { serve_spectator(&mut to_client, &mut from_client, &served).await });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(state.broadcaster.spectator_count(), 1);

        clock.apply(ClockCommand::Start);
        clock.tick();
        clock.tick();

        let hello = next_text_frame(&mut client_frames).await;
        assert_eq!(hello["type"], "hello");
        assert_eq!(hello["mode"]["mode"], "push");

        let mut sequences = Vec::new();
        for _ in 0..4 {
            let frame = next_text_frame(&mut client_frames).await;
            assert_eq!(frame["type"], "snapshot");
            sequences.push(frame["data"]["sequence"].as_u64().unwrap());
        }
        assert_eq!(sequences, vec![0, 1, 2, 3]);

        client_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(task.await.unwrap(), "closed by client");
        assert_eq!(state.broadcaster.spectator_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_hits_idle_timeout() {
        let (mut state, _clock) = test_state();
        state.spectator_idle_timeout = Duration::from_secs(4);
        let (mut to_client, _client_frames) = mpsc::unbounded::<Message>();
        let (_client_tx, mut from_client) = client_pair();

        let started = Instant::now();
        let served = state.clone();
        let task = tokio::spawn(async move { serve_spectator(&mut to_client, &mut from_client, &served).await });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(state.broadcaster.spectator_count(), 1);

        assert_eq!(task.await.unwrap(), "idle timeout");
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(state.broadcaster.spectator_count(), 0);
        assert!(state.broadcaster.registrations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_frames_keep_connection_alive() {
        let (mut state, _clock) = test_state();
        state.spectator_idle_timeout = Duration::from_secs(4);
        let (mut to_client, _client_frames) = mpsc::unbounded::<Message>();
        let (client_tx, mut from_client) = client_pair();

        let served = state.clone();
        let task = tokio::spawn(async move { serve_spectator(&mut to_client, &mut from_client, &served).await });

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            client_tx.unbounded_send(Ok(Message::Pong(Bytes::new()))).unwrap();
        }
        assert_eq!(state.broadcaster.spectator_count(), 1);

        client_tx.unbounded_send(Err("connection reset".to_string())).unwrap();
        assert_eq!(task.await.unwrap(), "socket error: connection reset");
        assert_eq!(state.broadcaster.spectator_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_client_hits_send_timeout() {
        let (state, _clock) = test_state();
        // Nobody reads the client side, so frames never flush.
        let (mut to_client, _client_frames) = mpsc::channel::<Message>(0);
        let (_client_tx, mut from_client) = client_pair();

        let served = state.clone();
        let task = tokio::spawn(async move { serve_spectator(&mut to_client, &mut from_client, &served).await });

        assert_eq!(task.await.unwrap(), "send timed out");
        assert_eq!(state.broadcaster.spectator_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_shutdown_closes_socket() {
        let (state, _clock) = test_state();
        let (mut to_client, mut client_frames) = mpsc::unbounded::<Message>();
        let (_client_tx, mut from_client) = client_pair();

        let served = state.clone();
        let task = tokio::spawn(async move { serve_spectator(&mut to_client, &mut from_client, &served).await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        state.broadcaster.close_all();
        assert_eq!(task.await.unwrap(), "server shutting down");

        let mut last = None;
        while let Some(message) = client_frames.next().await {
            last = Some(message);
        }
        assert!(matches!(last, Some(Message::Close(None))));
    }
}

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use common::id_generator::generate_client_id;
use common::snake::Direction;
use common::{ClientId, ModeState, log};

use crate::broadcaster::ObserverRegistration;
use crate::control_seat::ControlError;
use crate::game_clock::ClockCommand;
use crate::server_config::Clamped;
use crate::web_server::WebServerState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ControlError> for ApiError {
    fn from(error: ControlError) -> Self {
        let status = match error {
            ControlError::NotController => StatusCode::FORBIDDEN,
            ControlError::NoActivePlayer | ControlError::SeatTaken => StatusCode::CONFLICT,
            ControlError::MissingClientId => StatusCode::BAD_REQUEST,
            ControlError::ClockStopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "status": self.status.as_u16(),
        });

        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self { status: "ok" })
    }
}

/// Carries no snapshot: a reset queued here is applied by the clock task
/// later, so the first pushed or pulled snapshot is the authoritative one.
#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub client_id: ClientId,
    pub mode: ModeState,
    pub game_reset: bool,
}

#[derive(Debug, Serialize)]
pub struct SettingResponse<T> {
    pub setting: &'static str,
    pub requested: T,
    pub applied: T,
    pub clamped: bool,
}

impl<T: Copy + PartialEq> SettingResponse<T> {
    fn new(setting: &'static str, clamped: Clamped<T>) -> Json<Self> {
        Json(Self {
            setting,
            requested: clamped.requested,
            applied: clamped.applied,
            clamped: clamped.was_clamped(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GridSizeResponse {
    pub requested_width: usize,
    pub requested_height: usize,
    pub width: usize,
    pub height: usize,
    pub applies_on_reset: bool,
}

#[derive(Debug, Serialize)]
pub struct SpectatorCountResponse {
    pub count: usize,
    pub observers: Vec<ObserverRegistration>,
}

fn caller(headers: &HeaderMap) -> Result<ClientId, ControlError> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ClientId::from)
        .ok_or(ControlError::MissingClientId)
}

/// Resolves the caller and checks that it holds the seat.
fn seated_caller(state: &WebServerState, headers: &HeaderMap) -> Result<ClientId, ControlError> {
    let client_id = caller(headers)?;
    state.seat.authorize(&client_id)?;
    Ok(client_id)
}

pub async fn connect(State(state): State<WebServerState>) -> ApiResult<ConnectResponse> {
    let client_id = ClientId::new(generate_client_id());
    state.seat.claim(client_id.clone())?;

    let game_reset = state.broadcaster.latest().game_over;
    if game_reset {
        state.clock.send(ClockCommand::Reset)?;
    }

    Ok(Json(ConnectResponse {
        client_id,
        mode: state.mode.current(),
        game_reset,
    }))
}

pub async fn disconnect(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<StatusResponse> {
    let client_id = caller(&headers)?;
    state.seat.release(&client_id)?;
    state.clock.send(ClockCommand::Pause)?;
    Ok(StatusResponse::ok())
}

pub async fn change_direction(
    State(state): State<WebServerState>,
    headers: HeaderMap,
    Path(direction): Path<String>,
) -> ApiResult<StatusResponse> {
    let direction: Direction = direction.parse().map_err(ApiError::bad_request)?;
    seated_caller(&state, &headers)?;
    state.clock.turn(direction)?;
    Ok(StatusResponse::ok())
}

async fn control(state: &WebServerState, headers: &HeaderMap, command: ClockCommand) -> ApiResult<StatusResponse> {
    let client_id = seated_caller(state, headers)?;
    log!("Player {} sent {:?}", client_id, command);
    state.clock.send(command)?;
    Ok(StatusResponse::ok())
}

pub async fn start(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<StatusResponse> {
    control(&state, &headers, ClockCommand::Start).await
}

pub async fn pause(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<StatusResponse> {
    control(&state, &headers, ClockCommand::Pause).await
}

pub async fn resume(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<StatusResponse> {
    control(&state, &headers, ClockCommand::Resume).await
}

pub async fn reset(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<StatusResponse> {
    control(&state, &headers, ClockCommand::Reset).await
}

pub async fn set_speed(
    State(state): State<WebServerState>,
    headers: HeaderMap,
    Path(ms): Path<u64>,
) -> ApiResult<SettingResponse<u64>> {
    seated_caller(&state, &headers)?;
    let clamped = state.clock.set_tick_interval_ms(ms)?;
    Ok(SettingResponse::new("tick_interval_ms", clamped))
}

pub async fn set_polling_delay(
    State(state): State<WebServerState>,
    headers: HeaderMap,
    Path(ms): Path<u64>,
) -> ApiResult<SettingResponse<u64>> {
    seated_caller(&state, &headers)?;
    let clamped = state.pull_delay.set(ms);
    log!("Pull delay set to {}ms", clamped.applied);
    Ok(SettingResponse::new("pull_delay_ms", clamped))
}

pub async fn set_buffer_size(
    State(state): State<WebServerState>,
    headers: HeaderMap,
    Path(size): Path<usize>,
) -> ApiResult<SettingResponse<usize>> {
    seated_caller(&state, &headers)?;
    let clamped = state.broadcaster.set_buffer_capacity(size);
    log!("Observer buffer size set to {}", clamped.applied);
    Ok(SettingResponse::new("observer_buffer_size", clamped))
}

pub async fn set_grid_size(
    State(state): State<WebServerState>,
    headers: HeaderMap,
    Path((width, height)): Path<(usize, usize)>,
) -> ApiResult<GridSizeResponse> {
    seated_caller(&state, &headers)?;
    let (applied_width, applied_height) = state.clock.set_field_size(width, height)?;
    Ok(Json(GridSizeResponse {
        requested_width: width,
        requested_height: height,
        width: applied_width,
        height: applied_height,
        applies_on_reset: true,
    }))
}

pub async fn toggle_mode(State(state): State<WebServerState>, headers: HeaderMap) -> ApiResult<ModeState> {
    let client_id = caller(&headers)?;
    Ok(Json(state.mode.toggle(&client_id)?))
}

pub async fn get_mode(State(state): State<WebServerState>) -> Json<ModeState> {
    Json(state.mode.current())
}

pub async fn spectator_count(State(state): State<WebServerState>) -> Json<SpectatorCountResponse> {
    let observers = state.broadcaster.registrations();
    Json(SpectatorCountResponse {
        count: observers.len(),
        observers,
    })
}

pub async fn health() -> Json<StatusResponse> {
    StatusResponse::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use common::DeliveryMode;

    use crate::web_server::test_support::test_state;

    fn headers_for(client_id: &ClientId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(client_id.as_str()).unwrap());
        headers
    }

    async fn connect_player(state: &WebServerState) -> ClientId {
        connect(State(state.clone())).await.unwrap().0.client_id
    }

    #[tokio::test]
    async fn test_connect_claims_seat_once() {
        let (state, _clock) = test_state();
        let Json(response) = connect(State(state.clone())).await.unwrap();
        assert!(!response.game_reset);
        assert_eq!(state.seat.holder(), Some(response.client_id));

        let second = connect(State(state.clone())).await.unwrap_err();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_connect_resets_finished_game() {
        let (state, mut clock) = test_state();
        clock.apply(ClockCommand::Start);
        while clock.tick().is_some() {}
        assert!(state.broadcaster.latest().game_over);

        let Json(response) = connect(State(state.clone())).await.unwrap();
        assert!(response.game_reset);
        clock.process_queued_commands();
        let latest = state.broadcaster.latest();
        assert!(!latest.game_over);
        assert_eq!(latest.round, 1);
    }

    #[tokio::test]
    async fn test_toggle_mode_requires_controller() {
        let (state, _clock) = test_state();
        let client_id = connect_player(&state).await;

        let rejected = toggle_mode(State(state.clone()), headers_for(&ClientId::from("viewer")))
            .await
            .unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.mode.current().version, 0);

        let Json(mode) = toggle_mode(State(state.clone()), headers_for(&client_id)).await.unwrap();
        assert_eq!(mode, ModeState { mode: DeliveryMode::Pull, version: 1 });
        assert_eq!(get_mode(State(state.clone())).await.0, mode);
    }

    #[tokio::test]
    async fn test_missing_header_is_bad_request() {
        let (state, _clock) = test_state();
        connect_player(&state).await;
        let error = start(State(state.clone()), HeaderMap::new()).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_control_without_player_is_conflict() {
        let (state, _clock) = test_state();
        let error = pause(State(state.clone()), headers_for(&ClientId::from("ghost")))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_direction_is_validated_and_queued() {
        let (state, mut clock) = test_state();
        let client_id = connect_player(&state).await;

        let error = change_direction(
            State(state.clone()),
            headers_for(&client_id),
            Path("sideways".to_string()),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        change_direction(State(state.clone()), headers_for(&client_id), Path("down".to_string()))
            .await
            .unwrap();
        start(State(state.clone()), headers_for(&client_id)).await.unwrap();
        clock.process_queued_commands();
        let snapshot = clock.tick().unwrap();
        assert_eq!(snapshot.snake.direction, Direction::Down);
    }

    #[tokio::test]
    async fn test_settings_report_clamping() {
        let (state, _clock) = test_state();
        let client_id = connect_player(&state).await;

        let Json(speed) = set_speed(State(state.clone()), headers_for(&client_id), Path(10))
            .await
            .unwrap();
        assert_eq!((speed.requested, speed.applied, speed.clamped), (10, 100, true));

        let Json(delay) = set_polling_delay(State(state.clone()), headers_for(&client_id), Path(700))
            .await
            .unwrap();
        assert!(!delay.clamped);
        assert_eq!(state.pull_delay.get().as_millis(), 700);

        let Json(buffer) = set_buffer_size(State(state.clone()), headers_for(&client_id), Path(1000))
            .await
            .unwrap();
        assert_eq!(buffer.applied, 256);
        assert_eq!(state.broadcaster.buffer_capacity(), 256);

        let Json(grid) = set_grid_size(State(state.clone()), headers_for(&client_id), Path((5, 40)))
            .await
            .unwrap();
        assert_eq!((grid.width, grid.height), (10, 40));
    }

    #[tokio::test]
    async fn test_disconnect_frees_seat() {
        let (state, _clock) = test_state();
        let client_id = connect_player(&state).await;

        let error = disconnect(State(state.clone()), headers_for(&ClientId::from("viewer")))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::FORBIDDEN);

        disconnect(State(state.clone()), headers_for(&client_id)).await.unwrap();
        assert_eq!(state.seat.holder(), None);
        connect_player(&state).await;
    }

    #[tokio::test]
    async fn test_spectator_count_lists_push_observers() {
        let (state, _clock) = test_state();
        let _a = state.broadcaster.register_push();
        let _b = state.broadcaster.register_push();
        let Json(response) = spectator_count(State(state.clone())).await;
        assert_eq!(response.count, 2);
        assert_eq!(response.observers.len(), 2);
    }

    #[test]
    fn test_error_body() {
        let response = ApiError::from(ControlError::NotController).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

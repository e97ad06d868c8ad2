use crate::application::polling::PollUpdate;
use crate::application::settings_store::SettingsStore;
use crate::application::use_cases::list_builds::{DEFAULT_PAGE_SIZE, ListBuildsInteractor};
use crate::application::use_cases::stream_builds::{
    StreamBuildsInteractor, StreamBuildsUseCase, StreamBuildsUseCaseInput,
};
use crate::application::use_cases::watch_build::WatchBuildInteractor;
use crate::domain::errors::TravisError;
use crate::domain::models::build::{Build, BuildsPage, UserInfo};
use crate::domain::models::entity::Entity;
use crate::domain::models::settings::{Settings, SettingsState};
use crate::infrastructures::adapters::secondary::external_apis::travis::TravisCiApiClient;
use axum::extract::ws::Utf8Bytes;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub list_builds: Arc<ListBuildsInteractor<TravisCiApiClient>>,
    pub watch_build: Arc<WatchBuildInteractor<TravisCiApiClient>>,
    pub stream_builds: Arc<StreamBuildsInteractor<TravisCiApiClient>>,
}

impl AppState {
    /// Every view re-reads persisted settings when it is opened.
    fn mount(&self) -> &SettingsStore {
        self.settings.rehydrate();
        &self.settings
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

pub struct ApiError(TravisError);

impl From<TravisError> for ApiError {
    fn from(error: TravisError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        let (status, body) = match self.0 {
            TravisError::MissingAnnotation { annotation } => (
                StatusCode::NOT_FOUND,
                json!({ "error": "missing_annotation", "annotation": annotation, "message": message }),
            ),
            TravisError::MissingCredentials => (
                StatusCode::CONFLICT,
                json!({ "error": "missing_credentials", "message": message }),
            ),
            TravisError::Request { .. } | TravisError::Discovery(_) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "request_failed", "message": message }),
            ),
            TravisError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "storage_failed", "message": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Entity content tab: one page of builds for the annotated repository.
#[tracing::instrument(name = "entity_builds", skip(state, entity), fields(entity = %entity.metadata.name))]
async fn entity_builds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
    Json(entity): Json<Entity>,
) -> ApiResult<Json<BuildsPage>> {
    state.mount();
    let slug = entity.repo_slug()?;
    let page = state
        .list_builds
        .fetch_page(&slug, query.page(), query.page_size())
        .await?;
    Ok(Json(page))
}

/// Overview card: the newest build of the annotated repository.
#[tracing::instrument(name = "entity_latest_build", skip(state, entity), fields(entity = %entity.metadata.name))]
async fn entity_latest_build(
    State(state): State<Arc<AppState>>,
    Json(entity): Json<Entity>,
) -> ApiResult<Json<Option<Build>>> {
    state.mount();
    let slug = entity.repo_slug()?;
    Ok(Json(state.list_builds.latest_build(&slug).await?))
}

#[tracing::instrument(name = "list_builds", skip(state))]
async fn list_builds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<BuildsPage>> {
    state.mount();
    let page = state
        .list_builds
        .fetch_configured_page(query.page(), query.page_size())
        .await?;
    Ok(Json(page))
}

#[tracing::instrument(name = "get_build", skip(state))]
async fn get_build(
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<u64>,
) -> ApiResult<Json<Build>> {
    state.mount();
    Ok(Json(state.watch_build.get_build(build_id).await?))
}

#[tracing::instrument(name = "restart_build", skip(state))]
async fn restart_build(
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<u64>,
) -> StatusCode {
    state.watch_build.restart_build(build_id).await;
    StatusCode::ACCEPTED
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsState> {
    Json(state.mount().get_settings())
}

#[tracing::instrument(name = "save_settings", skip(state, settings))]
async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> ApiResult<StatusCode> {
    state.settings.save_settings(settings)?;
    state.settings.hide_settings_dialog();
    Ok(StatusCode::NO_CONTENT)
}

async fn show_settings_dialog(State(state): State<Arc<AppState>>) -> StatusCode {
    state.settings.show_settings_dialog();
    StatusCode::NO_CONTENT
}

async fn hide_settings_dialog(State(state): State<Arc<AppState>>) -> StatusCode {
    state.settings.hide_settings_dialog();
    StatusCode::NO_CONTENT
}

#[tracing::instrument(name = "get_user", skip(state))]
async fn get_user(State(state): State<Arc<AppState>>) -> ApiResult<Json<UserInfo>> {
    Ok(Json(state.list_builds.current_user().await?))
}

#[axum::debug_handler]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

#[tracing::instrument(name = "handle_socket", skip(socket, state))]
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, query: PageQuery) {
    tracing::info!("Client connected");
    state.mount();
    let input = StreamBuildsUseCaseInput {
        page: query.page(),
        page_size: query.page_size(),
    };
    let stream = state.stream_builds.execute(input);
    tokio::pin!(stream);

    loop {
        tokio::select! {
            Some(result) = stream.next() => {
                let frame = match result {
                    Ok(output) => match serde_json::to_string(&output) {
                        Ok(json_string) => json_string,
                        Err(e) => {
                            tracing::error!("Failed to serialize output: {:?}", e);
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::error!("Error from builds stream: {:?}", e);
                        format!("Error: {e:#}")
                    }
                };
                if socket.send(Message::Text(Utf8Bytes::from(frame))).await.is_err() {
                    tracing::info!("Client disconnected (send error)");
                    break;
                }
            },
            Some(Ok(msg)) = socket.recv() => {
                match msg {
                    Message::Close(_) => {
                        tracing::info!("Client disconnected (received close message)");
                        break;
                    }
                    Message::Text(t) => {
                        tracing::debug!("Received text from client: {}", t);
                    }
                    _ => {}
                }
            },
            else => {
                tracing::info!("Client or stream ended");
                break;
            }
        };
    }
    tracing::info!("Client disconnected");
}

#[axum::debug_handler]
pub async fn build_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<u64>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_build_socket(socket, state, build_id))
}

/// Frame for the latest outcome of a build watcher, if there is one yet.
fn build_frame(update: &PollUpdate<Build>) -> Option<String> {
    match update {
        Some(Ok(build)) => match serde_json::to_string(build) {
            Ok(json_string) => Some(json_string),
            Err(e) => {
                tracing::error!("Failed to serialize build: {:?}", e);
                None
            }
        },
        Some(Err(e)) => Some(format!("Error: {e}")),
        None => None,
    }
}

/// Streams one build while the client stays connected. The client may send
/// `stop` to pause refreshing and `start` to resume it.
#[tracing::instrument(name = "handle_build_socket", skip(socket, state))]
async fn handle_build_socket(mut socket: WebSocket, state: Arc<AppState>, build_id: u64) {
    tracing::info!("Client connected");
    state.mount();
    let mut watcher = state.watch_build.watcher();
    let mut updates = watcher.subscribe();
    watcher.start_polling(build_id);

    loop {
        tokio::select! {
            Ok(()) = updates.changed() => {
                let Some(frame) = build_frame(&updates.borrow_and_update()) else {
                    continue;
                };
                if socket.send(Message::Text(Utf8Bytes::from(frame))).await.is_err() {
                    tracing::info!("Client disconnected (send error)");
                    break;
                }
            },
            Some(Ok(msg)) = socket.recv() => {
                match msg {
                    Message::Close(_) => {
                        tracing::info!("Client disconnected (received close message)");
                        break;
                    }
                    Message::Text(t) => match t.as_str() {
                        "stop" => watcher.stop_polling(),
                        "start" => {
                            watcher.start_polling(build_id);
                        }
                        other => tracing::debug!("Received text from client: {}", other),
                    },
                    _ => {}
                }
            },
            else => {
                tracing::info!("Client or watcher ended");
                break;
            }
        };
    }
    tracing::info!("Client disconnected");
}

#[tracing::instrument(name = "health_check")]
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/entity/builds", post(entity_builds))
        .route("/api/entity/latest-build", post(entity_latest_build))
        .route("/api/builds", get(list_builds))
        .route("/api/builds/{id}", get(get_build))
        .route("/api/builds/{id}/restart", post(restart_build))
        .route("/api/settings", get(get_settings).put(save_settings))
        .route(
            "/api/settings/dialog",
            post(show_settings_dialog).delete(hide_settings_dialog),
        )
        .route("/api/user", get(get_user))
        .route("/ws/builds", get(websocket_handler))
        .route("/ws/builds/{id}", get(build_websocket_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    state::AppState,
    todos::dto::{MessageResponse, Pagination, TodoRequest, TodoResponse},
};

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
}

/// Ids that do not parse name no todo the caller owns.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Todo"))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn list_todos(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<TodoResponse>>, AppError> {
    let todos = state.todos.list(&identity, p.into()).await?;
    debug!(count = todos.len(), "listed todos");
    Ok(Json(todos.into_iter().map(TodoResponse::from).collect()))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn create_todo(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<TodoRequest>,
) -> Result<(StatusCode, HeaderMap, Json<TodoResponse>), AppError> {
    let fields = payload.into_fields()?;
    let todo = state.todos.create(&identity, fields).await?;
    info!(todo_id = %todo.id, "todo created");

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/todos/{}", todo.id))
        .map_err(|e| AppError::Internal(e.into()))?;
    headers.insert(LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(TodoResponse::from(todo))))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id()))]
pub async fn get_todo(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, AppError> {
    let id = parse_id(&id)?;
    let todo = state
        .todos
        .get(&identity, id)
        .await?
        .ok_or(AppError::NotFound("Todo"))?;
    Ok(Json(todo.into()))
}

#[instrument(skip(state, identity, payload), fields(user_id = %identity.id()))]
pub async fn update_todo(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<TodoRequest>,
) -> Result<Json<TodoResponse>, AppError> {
    let id = parse_id(&id)?;
    let fields = payload.into_fields()?;
    let todo = state
        .todos
        .update(&identity, id, fields)
        .await?
        .ok_or(AppError::NotFound("Todo"))?;
    info!(todo_id = %todo.id, "todo updated");
    Ok(Json(todo.into()))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id()))]
pub async fn delete_todo(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id)?;
    if !state.todos.delete(&identity, id).await? {
        return Err(AppError::NotFound("Todo"));
    }
    info!(todo_id = %id, "todo deleted");
    Ok(Json(MessageResponse {
        message: "Todo deleted successfully",
    }))
}

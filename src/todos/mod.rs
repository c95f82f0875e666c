pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub use repo::{MemoryTodoStore, PgTodoStore, TodoStore};

pub fn router() -> Router<AppState> {
    handlers::todo_routes()
}

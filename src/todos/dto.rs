use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::AppError,
    todos::repo_types::{Page, Todo, TodoFields},
};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 500;

/// Body of `POST /todos` and `PUT /todos/{id}`. Fields not listed here
/// (an `owner_id`, say) are ignored.
#[derive(Debug, Deserialize)]
pub struct TodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl TodoRequest {
    pub fn into_fields(self) -> Result<TodoFields, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title", "Title cannot be empty"));
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(AppError::validation(
                "title",
                format!("Title must be at most {TITLE_MAX_CHARS} characters"),
            ));
        }
        if let Some(d) = &self.description {
            if d.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(AppError::validation(
                    "description",
                    format!("Description must be at most {DESCRIPTION_MAX_CHARS} characters"),
                ));
            }
        }

        Ok(TodoFields {
            title: title.to_owned(),
            description: self.description,
            completed: self.completed,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TodoResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Todo> for TodoResponse {
    fn from(t: Todo) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description,
            completed: t.completed,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl From<Pagination> for Page {
    fn from(p: Pagination) -> Self {
        Page {
            limit: p.limit.clamp(1, MAX_LIMIT),
            offset: p.offset.max(0),
        }
    }
}

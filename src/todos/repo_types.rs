use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Todo row. `user_id` is the owner and never changes.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: OffsetDateTime,
}

/// Validated fields for a create or a full update. Carries no owner: the
/// store stamps it from the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoFields {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

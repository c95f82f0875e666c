use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::Identity,
    todos::repo_types::{Page, Todo, TodoFields},
};

/// Todo persistence scoped to one owner per call.
///
/// Every method takes the caller's [`Identity`]. Reads, updates and deletes
/// only ever match rows whose `user_id` is the caller's id, so another
/// user's todo looks exactly like a missing one (`None` / `false`). Creates
/// stamp the caller's id as owner.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn list(&self, owner: &Identity, page: Page) -> anyhow::Result<Vec<Todo>>;
    async fn get(&self, owner: &Identity, id: Uuid) -> anyhow::Result<Option<Todo>>;
    async fn create(&self, owner: &Identity, fields: TodoFields) -> anyhow::Result<Todo>;
    async fn update(
        &self,
        owner: &Identity,
        id: Uuid,
        fields: TodoFields,
    ) -> anyhow::Result<Option<Todo>>;
    async fn delete(&self, owner: &Identity, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgTodoStore {
    db: PgPool,
}

impl PgTodoStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TodoStore for PgTodoStore {
    async fn list(&self, owner: &Identity, page: Page) -> anyhow::Result<Vec<Todo>> {
        let rows = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, description, completed, created_at
            FROM todos
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner.id())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .context("list todos")?;
        Ok(rows)
    }

    async fn get(&self, owner: &Identity, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let row = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, description, completed, created_at
            FROM todos
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner.id())
        .fetch_optional(&self.db)
        .await
        .context("get todo")?;
        Ok(row)
    }

    async fn create(&self, owner: &Identity, fields: TodoFields) -> anyhow::Result<Todo> {
        let row = sqlx::query_as::<_, Todo>(
            r#"
            INSERT INTO todos (id, user_id, title, description, completed)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, description, completed, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner.id())
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.completed)
        .fetch_one(&self.db)
        .await
        .context("insert todo")?;
        Ok(row)
    }

    async fn update(
        &self,
        owner: &Identity,
        id: Uuid,
        fields: TodoFields,
    ) -> anyhow::Result<Option<Todo>> {
        let row = sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos
            SET title = $3, description = $4, completed = $5
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, completed, created_at
            "#,
        )
        .bind(id)
        .bind(owner.id())
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.completed)
        .fetch_optional(&self.db)
        .await
        .context("update todo")?;
        Ok(row)
    }

    async fn delete(&self, owner: &Identity, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner.id())
            .execute(&self.db)
            .await
            .context("delete todo")?;
        Ok(result.rows_affected() > 0)
    }
}

/// Process-local store for tests and database-less development runs.
/// Rows are kept in insertion order; listing walks them newest first.
#[derive(Default)]
pub struct MemoryTodoStore {
    rows: RwLock<Vec<Todo>>,
}

impl MemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoStore for MemoryTodoStore {
    async fn list(&self, owner: &Identity, page: Page) -> anyhow::Result<Vec<Todo>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|t| t.user_id == owner.id())
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, owner: &Identity, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|t| t.id == id && t.user_id == owner.id())
            .cloned())
    }

    async fn create(&self, owner: &Identity, fields: TodoFields) -> anyhow::Result<Todo> {
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: owner.id(),
            title: fields.title,
            description: fields.description,
            completed: fields.completed,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.write().await.push(todo.clone());
        Ok(todo)
    }

    async fn update(
        &self,
        owner: &Identity,
        id: Uuid,
        fields: TodoFields,
    ) -> anyhow::Result<Option<Todo>> {
        let mut rows = self.rows.write().await;
        let Some(todo) = rows
            .iter_mut()
            .find(|t| t.id == id && t.user_id == owner.id())
        else {
            return Ok(None);
        };
        todo.title = fields.title;
        todo.description = fields.description;
        todo.completed = fields.completed;
        Ok(Some(todo.clone()))
    }

    async fn delete(&self, owner: &Identity, id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|t| !(t.id == id && t.user_id == owner.id()));
        Ok(rows.len() < before)
    }
}

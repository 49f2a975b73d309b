use super::EntityBackend;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::error::{StoreError, StoreResult};
use crate::lock_recover;
use crate::model::entity::Entity;
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::Mutex;

/// Backend storing each entity as a JSON payload row in `entities`.
///
/// One connection serves every entity kind; rows are keyed by
/// `(kind, id)` and scoped by `user_id`.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        open_db(path).map(Self::new).map_err(db_error)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        open_db_in_memory().map(Self::new).map_err(db_error)
    }
}

#[async_trait]
impl<E: Entity> EntityBackend<E> for SqliteBackend {
    async fn insert(&self, user_id: &str, entity: &E) -> StoreResult<E> {
        let payload = encode(entity)?;
        let conn = lock_recover(&self.conn);
        conn.execute(
            "INSERT INTO entities (kind, id, user_id, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                E::KIND,
                entity.id(),
                user_id,
                payload,
                entity.created_at().timestamp_millis(),
                entity.updated_at().timestamp_millis(),
            ],
        )
        .map_err(sqlite_error)?;
        Ok(entity.clone())
    }

    async fn update(&self, user_id: &str, entity: &E) -> StoreResult<E> {
        let payload = encode(entity)?;
        let conn = lock_recover(&self.conn);
        let changed = conn
            .execute(
                "UPDATE entities
                 SET payload = ?1, updated_at = ?2
                 WHERE kind = ?3 AND id = ?4 AND user_id = ?5;",
                params![
                    payload,
                    entity.updated_at().timestamp_millis(),
                    E::KIND,
                    entity.id(),
                    user_id,
                ],
            )
            .map_err(sqlite_error)?;

        if changed == 0 {
            return Err(StoreError::not_found(E::KIND, entity.id()));
        }
        Ok(entity.clone())
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        let conn = lock_recover(&self.conn);
        conn.execute(
            "DELETE FROM entities WHERE kind = ?1 AND id = ?2 AND user_id = ?3;",
            params![E::KIND, id, user_id],
        )
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> StoreResult<Vec<E>> {
        let conn = lock_recover(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, payload FROM entities
                 WHERE kind = ?1 AND user_id = ?2
                 ORDER BY created_at ASC, id ASC;",
            )
            .map_err(sqlite_error)?;
        let mut rows = stmt.query(params![E::KIND, user_id]).map_err(sqlite_error)?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().map_err(sqlite_error)? {
            entities.push(parse_entity_row::<E>(row)?);
        }
        Ok(entities)
    }
}

fn parse_entity_row<E: Entity>(row: &Row<'_>) -> StoreResult<E> {
    let id: String = row.get("id").map_err(sqlite_error)?;
    let payload: String = row.get("payload").map_err(sqlite_error)?;
    let entity: E = serde_json::from_str(&payload).map_err(|err| {
        StoreError::rejected(format!(
            "invalid persisted {} payload for `{id}`: {err}",
            E::KIND
        ))
    })?;
    if entity.id() != id {
        return Err(StoreError::rejected(format!(
            "persisted {} row `{id}` carries mismatched payload id `{}`",
            E::KIND,
            entity.id()
        )));
    }
    Ok(entity)
}

fn encode<E: Entity>(entity: &E) -> StoreResult<String> {
    serde_json::to_string(entity)
        .map_err(|err| StoreError::rejected(format!("cannot encode {}: {err}", E::KIND)))
}

/// Contention and I/O trouble may clear up; anything else repeats verbatim.
fn sqlite_error(err: rusqlite::Error) -> StoreError {
    let transient = matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen
                | ErrorCode::OutOfMemory
                | ErrorCode::OperationInterrupted
        )
    );
    if transient {
        StoreError::operation(err.to_string())
    } else {
        StoreError::rejected(err.to_string())
    }
}

fn db_error(err: DbError) -> StoreError {
    match err {
        DbError::Sqlite(err) => sqlite_error(err),
        other => StoreError::rejected(other.to_string()),
    }
}

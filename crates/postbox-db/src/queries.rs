use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::models::{MessageRow, UserRow};
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Insert a new user. Username uniqueness is enforced by the table's
    /// UNIQUE index, so concurrent registrations of one name cannot both win.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow> {
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password: password_hash.to_string(),
            created_at: now_timestamp(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (&row.id, &row.username, &row.password, &row.created_at),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::UsernameTaken(username.to_string())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Messages --

    pub fn create_message(&self, name: &str, email: &str, message: &str) -> Result<MessageRow> {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
            created_at: now_timestamp(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, name, email, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (&row.id, &row.name, &row.email, &row.message, &row.created_at),
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    /// All messages in insertion order.
    pub fn list_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, message, created_at FROM messages ORDER BY rowid",
            )?;

            let rows = stmt
                .query_map([], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Look up a message by id. Anything that is not a UUID cannot name a
    /// stored message and yields `None`.
    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, email, message, created_at FROM messages WHERE id = ?1",
                [id.to_string()],
                message_from_row,
            )
            .optional()
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    stmt.query_row([username], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

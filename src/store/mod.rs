//! Conversation storage with SQLite
//!
//! One `Store` wraps one connection behind a mutex, so every call is
//! serialized and the handle can be shared across threads by reference.
//! Multi-row writes (turn append, cascade delete, conversation creation with
//! its first system prompt) run in a transaction while the lock is held.

mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::types::{Model, Role};

pub use schema::SCHEMA;

const USER_COLUMNS: &str = "user_id, username, api_key, created_at";
const CONVERSATION_COLUMNS: &str = "conversation_id, user_id, title, model, created_at";
const MESSAGE_COLUMNS: &str =
    "message_id, conversation_id, role, content, reasoning_content, created_at";
const TEMPLATE_COLUMNS: &str = "template_id, user_id, name, content, created_at";

/// Ordering for conversation listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened conversation store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while holding the lock leaves no open transaction behind
    /// (rusqlite rolls back on drop), so a poisoned lock is still usable.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // USERS
    // ============================================

    pub fn create_user(&self, username: &str, api_key: &str) -> Result<i64> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO users (username, api_key, created_at) VALUES (?, ?, ?)",
            params![username, api_key, Utc::now()],
        )
        .map_err(|e| unique_violation(e, || format!("username '{}' already exists", username)))?;

        let user_id = conn.last_insert_rowid();
        debug!(user_id, username, "registered user");
        Ok(user_id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<UserRow> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"),
            params![user_id],
            UserRow::from_row,
        );

        match result {
            Ok(user) => Ok(user),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(ChatError::not_found("user", user_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user(&self, username: &str) -> Result<Option<UserRow>> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
            params![username],
            UserRow::from_row,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_api_key(&self, user_id: i64, api_key: &str) -> Result<()> {
        let updated = self.lock_conn().execute(
            "UPDATE users SET api_key = ? WHERE user_id = ?",
            params![api_key, user_id],
        )?;

        if updated == 0 {
            return Err(ChatError::not_found("user", user_id));
        }
        debug!(user_id, "stored api key updated");
        Ok(())
    }

    // ============================================
    // CONVERSATIONS
    // ============================================

    /// Insert a conversation and, when given, its first system message
    pub fn create_conversation(
        &self,
        user_id: i64,
        title: &str,
        model: Model,
        system_prompt: Option<&str>,
    ) -> Result<i64> {
        let mut conn = self.lock_conn();
        ensure_user(&conn, user_id)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations (user_id, title, model, created_at) VALUES (?, ?, ?, ?)",
            params![user_id, title, model, Utc::now()],
        )?;
        let conversation_id = tx.last_insert_rowid();

        if let Some(prompt) = system_prompt {
            insert_message_row(&tx, conversation_id, Role::System, prompt, None)?;
        }
        tx.commit()?;

        debug!(conversation_id, user_id, %model, "created conversation");
        Ok(conversation_id)
    }

    pub fn get_conversation(&self, conversation_id: i64) -> Result<ConversationRow> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE conversation_id = ?"),
            params![conversation_id],
            ConversationRow::from_row,
        );

        match result {
            Ok(conversation) => Ok(conversation),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(ChatError::not_found("conversation", conversation_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_conversations(&self, user_id: i64, order: ListOrder) -> Result<Vec<ConversationRow>> {
        let direction = match order {
            ListOrder::NewestFirst => "DESC",
            ListOrder::OldestFirst => "ASC",
        };
        let query = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE user_id = ?
             ORDER BY conversation_id {direction}"
        );

        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![user_id], ConversationRow::from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_conversation_model(&self, conversation_id: i64, model: Model) -> Result<()> {
        let updated = self.lock_conn().execute(
            "UPDATE conversations SET model = ? WHERE conversation_id = ?",
            params![model, conversation_id],
        )?;

        if updated == 0 {
            return Err(ChatError::not_found("conversation", conversation_id));
        }
        debug!(conversation_id, %model, "conversation model updated");
        Ok(())
    }

    /// Delete a conversation and all of its messages; returns the number of
    /// messages removed
    pub fn delete_conversation(&self, conversation_id: i64) -> Result<usize> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM conversations WHERE conversation_id = ?",
            params![conversation_id],
        )?;

        if deleted == 0 {
            // Dropping the transaction rolls back
            return Err(ChatError::not_found("conversation", conversation_id));
        }
        tx.commit()?;

        debug!(conversation_id, messages = removed, "deleted conversation");
        Ok(removed)
    }

    // ============================================
    // MESSAGES
    // ============================================

    pub fn insert_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        reasoning_content: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock_conn();
        ensure_conversation(&conn, conversation_id)?;
        insert_message_row(&conn, conversation_id, role, content, reasoning_content)
    }

    /// Persist one completed turn: the user message, then the assistant reply.
    /// Both rows land or neither does.
    pub fn append_turn(
        &self,
        conversation_id: i64,
        user_text: &str,
        reply: &str,
        reasoning_content: Option<&str>,
    ) -> Result<(i64, i64)> {
        let mut conn = self.lock_conn();
        ensure_conversation(&conn, conversation_id)?;

        let tx = conn.transaction()?;
        let user_message_id = insert_message_row(&tx, conversation_id, Role::User, user_text, None)?;
        let reply_id = insert_message_row(
            &tx,
            conversation_id,
            Role::Assistant,
            reply,
            reasoning_content,
        )?;
        tx.commit()?;

        Ok((user_message_id, reply_id))
    }

    /// Full message log of a conversation in creation order
    pub fn messages(&self, conversation_id: i64) -> Result<Vec<MessageRow>> {
        let conn = self.lock_conn();
        ensure_conversation(&conn, conversation_id)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?
             ORDER BY message_id ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], MessageRow::from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ============================================
    // PROMPT TEMPLATES
    // ============================================

    pub fn insert_template(&self, user_id: i64, name: &str, content: &str) -> Result<i64> {
        let conn = self.lock_conn();
        ensure_user(&conn, user_id)?;

        conn.execute(
            "INSERT INTO prompt_templates (user_id, name, content, created_at) VALUES (?, ?, ?, ?)",
            params![user_id, name, content, Utc::now()],
        )
        .map_err(|e| unique_violation(e, || format!("template '{}' already exists", name)))?;

        let template_id = conn.last_insert_rowid();
        debug!(template_id, user_id, name, "created prompt template");
        Ok(template_id)
    }

    pub fn get_template(&self, template_id: i64) -> Result<TemplateRow> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM prompt_templates WHERE template_id = ?"),
            params![template_id],
            TemplateRow::from_row,
        );

        match result {
            Ok(template) => Ok(template),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(ChatError::not_found("template", template_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_templates(&self, user_id: i64) -> Result<Vec<TemplateRow>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM prompt_templates
             WHERE user_id = ?
             ORDER BY template_id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id], TemplateRow::from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_template(&self, template_id: i64) -> Result<()> {
        let deleted = self.lock_conn().execute(
            "DELETE FROM prompt_templates WHERE template_id = ?",
            params![template_id],
        )?;

        if deleted == 0 {
            return Err(ChatError::not_found("template", template_id));
        }
        Ok(())
    }
}

// ============================================
// HELPERS
// ============================================

fn ensure_user(conn: &Connection, user_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?)",
        params![user_id],
        |row| row.get(0),
    )?;

    if exists {
        Ok(())
    } else {
        Err(ChatError::not_found("user", user_id))
    }
}

fn ensure_conversation(conn: &Connection, conversation_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE conversation_id = ?)",
        params![conversation_id],
        |row| row.get(0),
    )?;

    if exists {
        Ok(())
    } else {
        Err(ChatError::not_found("conversation", conversation_id))
    }
}

fn insert_message_row(
    conn: &Connection,
    conversation_id: i64,
    role: Role,
    content: &str,
    reasoning_content: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (conversation_id, role, content, reasoning_content, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![conversation_id, role, content, reasoning_content, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn unique_violation(err: rusqlite::Error, describe: impl FnOnce() -> String) -> ChatError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            ChatError::ConstraintViolation(describe())
        }
        _ => err.into(),
    }
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            username: row.get(1)?,
            api_key: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub conversation_id: i64,
    pub user_id: i64,
    pub title: String,
    pub model: Model,
    pub created_at: DateTime<Utc>,
}

impl ConversationRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            model: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: i64,
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    pub reasoning_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            reasoning_content: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub template_id: i64,
    pub user_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TemplateRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            template_id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

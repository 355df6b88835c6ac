//! SQLite schema definition
//!
//! Four relations: users, conversations, messages, prompt_templates.
//! Messages cascade with their conversation; everything else is deleted
//! explicitly or never.

pub const SCHEMA: &str = r#"
-- ============================================
-- USERS
-- ============================================

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    api_key TEXT NOT NULL,
    created_at DATETIME NOT NULL
);

-- ============================================
-- CONVERSATIONS
-- ============================================

CREATE TABLE IF NOT EXISTS conversations (
    conversation_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    model TEXT NOT NULL,                   -- 'deepseek-chat', 'deepseek-reasoner'
    created_at DATETIME NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(user_id)
);

-- ============================================
-- MESSAGES
-- ============================================

-- Several system rows may exist per conversation; the newest one is effective
CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant')),
    content TEXT NOT NULL,
    reasoning_content TEXT,                -- reasoner replies only
    created_at DATETIME NOT NULL,
    FOREIGN KEY(conversation_id) REFERENCES conversations(conversation_id) ON DELETE CASCADE
);

-- ============================================
-- PROMPT TEMPLATES
-- ============================================

CREATE TABLE IF NOT EXISTS prompt_templates (
    template_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    UNIQUE(user_id, name),
    FOREIGN KEY(user_id) REFERENCES users(user_id)
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, conversation_id);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, message_id);
CREATE INDEX IF NOT EXISTS idx_templates_user ON prompt_templates(user_id);
"#;

//! API key resolution
//!
//! Priority: explicit argument, environment variable, stored key, then the
//! caller-supplied prompt. Whatever wins is written back to the user row when
//! it differs from what is stored.

use sha2::{Digest, Sha256};
use std::io;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::store::Store;

/// Interactive source of last resort for an API key
pub trait KeyPrompt {
    fn read_key(&self, prompt: &str) -> io::Result<String>;
}

/// Headless prompt that never yields a key
pub struct NoPrompt;

impl KeyPrompt for NoPrompt {
    fn read_key(&self, _prompt: &str) -> io::Result<String> {
        Ok(String::new())
    }
}

const PROMPT_TEXT: &str = "DeepSeek API key: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySource {
    Explicit,
    Environment,
    Stored,
    Prompt,
}

impl KeySource {
    fn as_str(&self) -> &'static str {
        match self {
            KeySource::Explicit => "explicit",
            KeySource::Environment => "environment",
            KeySource::Stored => "stored",
            KeySource::Prompt => "prompt",
        }
    }
}

pub struct CredentialResolver<'a> {
    store: &'a Store,
    key_env: String,
    prompt: &'a dyn KeyPrompt,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(store: &'a Store, key_env: impl Into<String>, prompt: &'a dyn KeyPrompt) -> Self {
        Self {
            store,
            key_env: key_env.into(),
            prompt,
        }
    }

    /// Resolve the API key for an existing user
    pub fn resolve(&self, user_id: i64, explicit_key: Option<&str>) -> Result<String> {
        let user = self.store.get_user(user_id)?;

        let (key, source) = match self.supplied_key(explicit_key) {
            Some(found) => found,
            None => match usable(Some(user.api_key.as_str())) {
                Some(stored) => (stored, KeySource::Stored),
                None => (
                    self.prompted_key()?
                        .ok_or_else(|| ChatError::CredentialUnavailable(format!("user {user_id}")))?,
                    KeySource::Prompt,
                ),
            },
        };

        if key != user.api_key {
            self.store.update_api_key(user_id, &key)?;
        }

        info!(
            user_id,
            source = source.as_str(),
            key = %fingerprint(&key),
            "resolved api key"
        );
        Ok(key)
    }

    /// Find a user by name, or register it with a freshly acquired key.
    /// Returns the user id and the key to use.
    pub fn bootstrap(&self, username: &str, explicit_key: Option<&str>) -> Result<(i64, String)> {
        if let Some(user) = self.store.find_user(username)? {
            let key = self.resolve(user.user_id, explicit_key)?;
            return Ok((user.user_id, key));
        }

        let (key, source) = match self.supplied_key(explicit_key) {
            Some(found) => found,
            None => (
                self.prompted_key()?
                    .ok_or_else(|| ChatError::CredentialUnavailable(username.to_string()))?,
                KeySource::Prompt,
            ),
        };

        let user_id = self.store.create_user(username, &key)?;
        info!(
            user_id,
            username,
            source = source.as_str(),
            key = %fingerprint(&key),
            "registered user with api key"
        );
        Ok((user_id, key))
    }

    /// Explicit argument, then environment
    fn supplied_key(&self, explicit_key: Option<&str>) -> Option<(String, KeySource)> {
        if let Some(key) = usable(explicit_key) {
            return Some((key, KeySource::Explicit));
        }

        let from_env = std::env::var(&self.key_env).ok();
        usable(from_env.as_deref()).map(|key| (key, KeySource::Environment))
    }

    fn prompted_key(&self) -> Result<Option<String>> {
        debug!(key_env = %self.key_env, "no api key found, prompting");
        let entered = self.prompt.read_key(PROMPT_TEXT)?;
        Ok(usable(Some(entered.as_str())))
    }
}

fn usable(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Short, non-reversible tag for a key, safe to log
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..4])
}

use anyhow::{anyhow, Result};

use crate::credentials::{fingerprint, CredentialResolver};
use crate::store::Store;

/// Look up a registered user by name
pub fn lookup(store: &Store, username: &str) -> Result<i64> {
    store
        .find_user(username)?
        .map(|u| u.user_id)
        .ok_or_else(|| anyhow!("User '{}' is not registered. Run 'seekchat user register' first.", username))
}

pub fn register(resolver: &CredentialResolver, username: &str, api_key: Option<&str>) -> Result<()> {
    let (user_id, key) = resolver.bootstrap(username, api_key)?;
    println!(
        "User '{}' ready (ID: {}, key {})",
        username,
        user_id,
        fingerprint(&key)
    );
    Ok(())
}

pub fn set_key(store: &Store, username: &str, api_key: &str) -> Result<()> {
    let user_id = lookup(store, username)?;
    store.update_api_key(user_id, api_key.trim())?;
    println!("Updated API key for '{}' (key {})", username, fingerprint(api_key.trim()));
    Ok(())
}

pub fn show(store: &Store, username: &str) -> Result<()> {
    let user = store
        .find_user(username)?
        .ok_or_else(|| anyhow!("User not found: {}", username))?;

    println!("User:    {}", user.username);
    println!("ID:      {}", user.user_id);
    println!("Created: {}", user.created_at.format("%Y-%m-%d %H:%M"));
    if user.api_key.is_empty() {
        println!("Key:     (none stored)");
    } else {
        println!("Key:     {}", fingerprint(&user.api_key));
    }
    Ok(())
}

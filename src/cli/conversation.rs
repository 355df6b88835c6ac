//! Conversation commands

use anyhow::Result;

use super::{print_history, truncate};
use crate::conversations::ConversationManager;
use crate::store::{ListOrder, Store};
use crate::types::Model;

pub struct NewConversation<'a> {
    pub title: &'a str,
    pub model: Model,
    pub system_prompt: Option<&'a str>,
    pub template: Option<i64>,
}

pub fn create(store: &Store, user_id: i64, new: NewConversation) -> Result<()> {
    let manager = ConversationManager::new(store);
    let id = match new.template {
        Some(template_id) => manager.create_from_template(user_id, new.title, new.model, template_id)?,
        None => manager.create(user_id, new.title, new.model, new.system_prompt)?,
    };
    println!("Conversation '{}' created with ID: {} ({})", new.title, id, new.model);
    Ok(())
}

pub fn list(store: &Store, user_id: i64, oldest_first: bool) -> Result<()> {
    let order = if oldest_first {
        ListOrder::OldestFirst
    } else {
        ListOrder::NewestFirst
    };
    let conversations = ConversationManager::new(store).list(user_id, order)?;

    if conversations.is_empty() {
        println!("No conversations found. Run 'seekchat conv new' first.");
        return Ok(());
    }

    println!("{:<6} {:<17} {:<18} {}", "ID", "Created", "Model", "Title");
    println!("{}", "-".repeat(80));
    for conv in conversations {
        println!(
            "{:<6} {:<17} {:<18} {}",
            conv.conversation_id,
            conv.created_at.format("%Y-%m-%d %H:%M"),
            conv.model,
            truncate(&conv.title, 40),
        );
    }
    Ok(())
}

pub fn delete(store: &Store, user_id: i64, conversation_id: i64) -> Result<()> {
    ConversationManager::new(store).delete(user_id, conversation_id)?;
    println!("Deleted conversation {}", conversation_id);
    Ok(())
}

pub fn set_model(store: &Store, user_id: i64, conversation_id: i64, model: Model) -> Result<()> {
    ConversationManager::new(store).set_model(user_id, conversation_id, model)?;
    println!("Conversation {} now uses {}", conversation_id, model);
    Ok(())
}

pub fn set_prompt(store: &Store, user_id: i64, conversation_id: i64, prompt: &str) -> Result<()> {
    ConversationManager::new(store).set_system_prompt(user_id, conversation_id, prompt)?;
    println!("System prompt set: {}", prompt);
    Ok(())
}

pub fn history(store: &Store, user_id: i64, conversation_id: i64) -> Result<()> {
    let manager = ConversationManager::new(store);
    let conversation = manager.get(user_id, conversation_id)?;
    let messages = manager.history(user_id, conversation_id)?;

    println!("\n{}", "=".repeat(80));
    println!(
        "Conversation {}: {} | {}",
        conversation.conversation_id, conversation.title, conversation.model
    );
    println!("{}", "=".repeat(80));
    print_history(&messages);
    Ok(())
}

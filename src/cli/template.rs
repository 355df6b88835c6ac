use anyhow::Result;

use super::truncate;
use crate::store::Store;
use crate::templates::TemplateManager;

pub fn create(store: &Store, user_id: i64, name: &str, content: &str) -> Result<()> {
    let id = TemplateManager::new(store).create(user_id, name, content)?;
    println!("Template '{}' created with ID: {}", name, id);
    Ok(())
}

pub fn list(store: &Store, user_id: i64) -> Result<()> {
    let templates = TemplateManager::new(store).list(user_id)?;
    if templates.is_empty() {
        println!("No templates found. Create one with 'seekchat template new'.");
        return Ok(());
    }

    println!("{:<6} {:<20} {}", "ID", "Name", "Content");
    println!("{}", "-".repeat(80));
    for t in templates {
        println!("{:<6} {:<20} {}", t.template_id, t.name, truncate(&t.content, 50));
    }
    Ok(())
}

pub fn delete(store: &Store, user_id: i64, template_id: i64) -> Result<()> {
    TemplateManager::new(store).delete(user_id, template_id)?;
    println!("Deleted template {}", template_id);
    Ok(())
}

pub fn apply(store: &Store, user_id: i64, template_id: i64, conversation_id: i64) -> Result<()> {
    let templates = TemplateManager::new(store);
    templates.apply(user_id, conversation_id, template_id)?;
    let template = templates.get(user_id, template_id)?;
    println!(
        "Applied template '{}' to conversation {}",
        template.name, conversation_id
    );
    Ok(())
}

//! Named, reusable system prompts

use tracing::info;

use crate::conversations::owned_conversation;
use crate::error::{ChatError, Result};
use crate::store::{Store, TemplateRow};
use crate::types::Role;

pub(crate) fn owned_template(store: &Store, user_id: i64, template_id: i64) -> Result<TemplateRow> {
    let template = store.get_template(template_id)?;
    if template.user_id != user_id {
        return Err(ChatError::PermissionDenied {
            user_id,
            entity: "template",
            id: template_id,
        });
    }
    Ok(template)
}

pub struct TemplateManager<'a> {
    store: &'a Store,
}

impl<'a> TemplateManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Fails with `ConstraintViolation` when the user already has a template
    /// with this name
    pub fn create(&self, user_id: i64, name: &str, content: &str) -> Result<i64> {
        self.store.insert_template(user_id, name, content)
    }

    /// Templates of a user in creation order
    pub fn list(&self, user_id: i64) -> Result<Vec<TemplateRow>> {
        self.store.list_templates(user_id)
    }

    pub fn get(&self, user_id: i64, template_id: i64) -> Result<TemplateRow> {
        owned_template(self.store, user_id, template_id)
    }

    pub fn delete(&self, user_id: i64, template_id: i64) -> Result<()> {
        owned_template(self.store, user_id, template_id)?;
        self.store.delete_template(template_id)?;
        info!(template_id, user_id, "prompt template deleted");
        Ok(())
    }

    /// Make a template the conversation's effective system prompt.
    ///
    /// Appends a system message; history and the template are left as they are.
    pub fn apply(&self, user_id: i64, conversation_id: i64, template_id: i64) -> Result<i64> {
        let template = owned_template(self.store, user_id, template_id)?;
        owned_conversation(self.store, user_id, conversation_id)?;

        let message_id = self.store.insert_message(
            conversation_id,
            Role::System,
            &template.content,
            None,
        )?;
        info!(
            conversation_id,
            template_id,
            name = %template.name,
            "template applied"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::ConversationManager;
    use crate::types::Model;

    #[test]
    fn test_create_and_list_in_creation_order() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let templates = TemplateManager::new(&store);

        templates.create(alice, "zeta", "z").unwrap();
        templates.create(alice, "alpha", "a").unwrap();

        let names: Vec<String> = templates
            .list(alice)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let templates = TemplateManager::new(&store);

        templates.create(alice, "helper", "v1").unwrap();
        assert!(matches!(
            templates.create(alice, "helper", "v2"),
            Err(ChatError::ConstraintViolation(_))
        ));
        assert_eq!(templates.list(alice).unwrap()[0].content, "v1");
    }

    #[test]
    fn test_create_for_unknown_user() {
        let store = Store::open_in_memory().unwrap();
        let templates = TemplateManager::new(&store);
        assert!(matches!(
            templates.create(1, "x", "y"),
            Err(ChatError::NotFound { entity: "user", .. })
        ));
    }

    #[test]
    fn test_apply_appends_system_message() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conversations = ConversationManager::new(&store);
        let templates = TemplateManager::new(&store);

        let conv = conversations
            .create(alice, "t", Model::Chat, Some("original"))
            .unwrap();
        store.append_turn(conv, "hi", "hello", None).unwrap();
        let template = templates.create(alice, "terse", "Answer in one word.").unwrap();

        templates.apply(alice, conv, template).unwrap();

        let history = conversations.history(alice, conv).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "original");
        assert_eq!(history[3].role, Role::System);
        assert_eq!(history[3].content, "Answer in one word.");
        assert_eq!(templates.get(alice, template).unwrap().content, "Answer in one word.");
    }

    #[test]
    fn test_apply_foreign_template_or_conversation() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let bob = store.create_user("bob", "k2").unwrap();
        let conversations = ConversationManager::new(&store);
        let templates = TemplateManager::new(&store);

        let alice_conv = conversations.create(alice, "t", Model::Chat, None).unwrap();
        let bob_template = templates.create(bob, "b", "bob's").unwrap();
        let alice_template = templates.create(alice, "a", "alice's").unwrap();

        assert!(matches!(
            templates.apply(alice, alice_conv, bob_template),
            Err(ChatError::PermissionDenied { entity: "template", .. })
        ));
        assert!(matches!(
            templates.apply(bob, alice_conv, bob_template),
            Err(ChatError::PermissionDenied { entity: "conversation", .. })
        ));
        assert!(conversations.history(alice, alice_conv).unwrap().is_empty());

        templates.apply(alice, alice_conv, alice_template).unwrap();
        assert_eq!(conversations.history(alice, alice_conv).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_template() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let bob = store.create_user("bob", "k2").unwrap();
        let templates = TemplateManager::new(&store);
        let id = templates.create(alice, "a", "x").unwrap();

        assert!(matches!(
            templates.delete(bob, id),
            Err(ChatError::PermissionDenied { .. })
        ));
        templates.delete(alice, id).unwrap();
        assert!(matches!(
            templates.get(alice, id),
            Err(ChatError::NotFound { .. })
        ));
    }
}

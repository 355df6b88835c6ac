//! Conversation lifecycle, model choice and system prompt

use tracing::info;

use crate::error::{ChatError, Result};
use crate::store::{ConversationRow, ListOrder, MessageRow, Store};
use crate::templates::owned_template;
use crate::types::{Model, Role};

/// Load a conversation and check it belongs to `user_id`.
///
/// Missing conversations are `NotFound`; foreign ones are `PermissionDenied`.
pub(crate) fn owned_conversation(
    store: &Store,
    user_id: i64,
    conversation_id: i64,
) -> Result<ConversationRow> {
    let conversation = store.get_conversation(conversation_id)?;
    if conversation.user_id != user_id {
        return Err(ChatError::PermissionDenied {
            user_id,
            entity: "conversation",
            id: conversation_id,
        });
    }
    Ok(conversation)
}

pub struct ConversationManager<'a> {
    store: &'a Store,
}

impl<'a> ConversationManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Create a conversation, seeding its system prompt when one is given
    pub fn create(
        &self,
        user_id: i64,
        title: &str,
        model: Model,
        system_prompt: Option<&str>,
    ) -> Result<i64> {
        let conversation_id = self
            .store
            .create_conversation(user_id, title, model, system_prompt)?;
        info!(conversation_id, user_id, %model, "conversation created");
        Ok(conversation_id)
    }

    /// Create a conversation whose first system prompt is a template's content
    pub fn create_from_template(
        &self,
        user_id: i64,
        title: &str,
        model: Model,
        template_id: i64,
    ) -> Result<i64> {
        let template = owned_template(self.store, user_id, template_id)?;
        self.create(user_id, title, model, Some(&template.content))
    }

    pub fn list(&self, user_id: i64, order: ListOrder) -> Result<Vec<ConversationRow>> {
        self.store.list_conversations(user_id, order)
    }

    pub fn get(&self, user_id: i64, conversation_id: i64) -> Result<ConversationRow> {
        owned_conversation(self.store, user_id, conversation_id)
    }

    /// Delete a conversation and its messages.
    ///
    /// A conversation owned by someone else is reported as `NotFound`, so
    /// callers cannot discover other users' ids.
    pub fn delete(&self, user_id: i64, conversation_id: i64) -> Result<()> {
        match owned_conversation(self.store, user_id, conversation_id) {
            Ok(_) => {}
            Err(ChatError::PermissionDenied { .. }) => {
                return Err(ChatError::not_found("conversation", conversation_id));
            }
            Err(e) => return Err(e),
        }

        let removed = self.store.delete_conversation(conversation_id)?;
        info!(conversation_id, user_id, messages = removed, "conversation deleted");
        Ok(())
    }

    /// Switch the model used from the next turn on
    pub fn set_model(&self, user_id: i64, conversation_id: i64, model: Model) -> Result<()> {
        owned_conversation(self.store, user_id, conversation_id)?;
        self.store.update_conversation_model(conversation_id, model)?;
        info!(conversation_id, %model, "conversation model switched");
        Ok(())
    }

    /// Replace the effective system prompt by appending a new system message.
    /// Earlier system messages stay in the log.
    pub fn set_system_prompt(&self, user_id: i64, conversation_id: i64, prompt: &str) -> Result<i64> {
        owned_conversation(self.store, user_id, conversation_id)?;
        let message_id = self
            .store
            .insert_message(conversation_id, Role::System, prompt, None)?;
        info!(conversation_id, message_id, "system prompt replaced");
        Ok(message_id)
    }

    /// Full message log in creation order, stale system messages included
    pub fn history(&self, user_id: i64, conversation_id: i64) -> Result<Vec<MessageRow>> {
        owned_conversation(self.store, user_id, conversation_id)?;
        self.store.messages(conversation_id)
    }
}

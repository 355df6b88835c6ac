//! Turn engine: history assembly, dispatch, persistence
//!
//! A turn is persisted only after the remote call succeeds, and then as one
//! transaction (user message followed by the assistant reply).

use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::conversations::owned_conversation;
use crate::credentials::CredentialResolver;
use crate::error::Result;
use crate::remote::{ChatMessage, CompletionClient};
use crate::store::{MessageRow, Store};
use crate::types::Role;

/// Assistant reply returned to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub reasoning_content: Option<String>,
}

/// Build the outbound sequence for a new user message.
///
/// Only the newest system message survives, placed first; every other
/// message keeps its chronological position; `user_text` goes last.
pub fn outbound_messages(history: &[MessageRow], user_text: &str) -> Vec<ChatMessage> {
    let effective_system = history
        .iter()
        .rev()
        .find(|m| m.role == Role::System)
        .map(|m| ChatMessage::system(m.content.as_str()));

    effective_system
        .into_iter()
        .chain(
            history
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| ChatMessage::new(m.role, m.content.as_str())),
        )
        .chain(std::iter::once(ChatMessage::user(user_text)))
        .collect()
}

pub struct TurnEngine<'a> {
    store: &'a Store,
    client: &'a dyn CompletionClient,
    credentials: CredentialResolver<'a>,
    explicit_key: Option<&'a str>,
}

impl<'a> TurnEngine<'a> {
    pub fn new(
        store: &'a Store,
        client: &'a dyn CompletionClient,
        credentials: CredentialResolver<'a>,
    ) -> Self {
        Self {
            store,
            client,
            credentials,
            explicit_key: None,
        }
    }

    /// Key given by the caller for this session; it outranks the
    /// environment and the stored key on every turn.
    pub fn with_api_key(mut self, explicit_key: Option<&'a str>) -> Self {
        self.explicit_key = explicit_key;
        self
    }

    /// Send one user message and record the exchange.
    ///
    /// Blocks for as long as the remote call takes. Any failure before the
    /// final write leaves the conversation untouched.
    pub fn send(&self, user_id: i64, conversation_id: i64, user_text: &str) -> Result<Reply> {
        let span = info_span!("turn", turn_id = %Uuid::new_v4(), user_id, conversation_id);
        let _guard = span.enter();

        let conversation = owned_conversation(self.store, user_id, conversation_id)?;
        let history = self.store.messages(conversation_id)?;
        let outbound = outbound_messages(&history, user_text);

        let api_key = self.credentials.resolve(user_id, self.explicit_key)?;
        let model = conversation.model;

        debug!(%model, history = history.len(), outbound = outbound.len(), "dispatching turn");
        let completion = self.client.complete(&api_key, model, &outbound)?;

        let reasoning_content = if model.is_reasoner() {
            completion.reasoning_content
        } else {
            if completion.reasoning_content.is_some() {
                debug!(%model, "ignoring reasoning trace from non-reasoner model");
            }
            None
        };

        let (_, reply_id) = self.store.append_turn(
            conversation_id,
            user_text,
            &completion.content,
            reasoning_content.as_deref(),
        )?;
        info!(
            reply_id,
            %model,
            reasoning = reasoning_content.is_some(),
            "turn recorded"
        );

        Ok(Reply {
            content: completion.content,
            reasoning_content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::ConversationManager;
    use crate::credentials::NoPrompt;
    use crate::error::ChatError;
    use crate::remote::{Completion, RemoteError};
    use crate::templates::TemplateManager;
    use crate::types::Model;
    use std::sync::Mutex;

    const UNSET_ENV: &str = "SEEKCHAT_TEST_ENGINE_KEY_NEVER_SET";

    /// Completion double: answers "reply to <last message>", optionally with a
    /// reasoning trace, or fails with an HTTP status. Records every request.
    struct ScriptedClient {
        fail_with: Option<u16>,
        with_reasoning: bool,
        requests: Mutex<Vec<(String, Model, Vec<ChatMessage>)>>,
    }

    impl ScriptedClient {
        fn new(with_reasoning: bool) -> Self {
            Self {
                fail_with: None,
                with_reasoning,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::new(false)
            }
        }

        fn requests(&self) -> Vec<(String, Model, Vec<ChatMessage>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete(
            &self,
            api_key: &str,
            model: Model,
            messages: &[ChatMessage],
        ) -> std::result::Result<Completion, RemoteError> {
            self.requests
                .lock()
                .unwrap()
                .push((api_key.to_string(), model, messages.to_vec()));

            if let Some(status) = self.fail_with {
                return Err(RemoteError::Status {
                    status,
                    body: "Insufficient Balance".to_string(),
                });
            }

            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Completion {
                content: format!("reply to {last}"),
                reasoning_content: self.with_reasoning.then(|| format!("thinking about {last}")),
            })
        }
    }

    fn engine<'a>(store: &'a Store, client: &'a ScriptedClient) -> TurnEngine<'a> {
        TurnEngine::new(
            store,
            client,
            CredentialResolver::new(store, UNSET_ENV, &NoPrompt),
        )
    }

    fn message(id: i64, role: Role, content: &str) -> MessageRow {
        MessageRow {
            message_id: id,
            conversation_id: 1,
            role,
            content: content.to_string(),
            reasoning_content: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_outbound_uses_latest_system_message_only() {
        let history = vec![
            message(1, Role::System, "old prompt"),
            message(2, Role::User, "q1"),
            message(3, Role::Assistant, "a1"),
            message(4, Role::System, "new prompt"),
            message(5, Role::User, "q2"),
            message(6, Role::Assistant, "a2"),
        ];

        let outbound = outbound_messages(&history, "q3");
        assert_eq!(
            outbound,
            vec![
                ChatMessage::system("new prompt"),
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
                ChatMessage::assistant("a2"),
                ChatMessage::user("q3"),
            ]
        );
        assert_eq!(
            outbound.iter().filter(|m| m.role == Role::System).count(),
            1
        );
    }

    #[test]
    fn test_outbound_without_system_message() {
        let history = vec![message(1, Role::User, "q1"), message(2, Role::Assistant, "a1")];
        let outbound = outbound_messages(&history, "");
        assert_eq!(outbound.len(), 3);
        assert_eq!(outbound[0], ChatMessage::user("q1"));
        assert_eq!(outbound[2], ChatMessage::user(""));
    }

    #[test]
    fn test_alice_scenario_then_reasoner_switch() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conversations = ConversationManager::new(&store);
        let conv = conversations
            .create(alice, "t1", Model::Chat, Some("You are helpful."))
            .unwrap();

        // Chat model, even if the service volunteers a trace
        let chat_client = ScriptedClient::new(true);
        let reply = engine(&store, &chat_client).send(alice, conv, "Hi").unwrap();
        assert_eq!(reply.content, "reply to Hi");
        assert_eq!(reply.reasoning_content, None);

        let history = conversations.history(alice, conv).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, "You are helpful.");
        assert_eq!((history[1].role, history[1].content.as_str()), (Role::User, "Hi"));
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(history[2].reasoning_content, None);

        let requests = chat_client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "k1");
        assert_eq!(requests[0].1, Model::Chat);
        assert_eq!(
            requests[0].2,
            vec![ChatMessage::system("You are helpful."), ChatMessage::user("Hi")]
        );

        // Switch to the reasoner; takes effect on the next dispatch
        conversations.set_model(alice, conv, Model::Reasoner).unwrap();
        let reasoner_client = ScriptedClient::new(true);
        let reply = engine(&store, &reasoner_client)
            .send(alice, conv, "Explain X")
            .unwrap();
        assert_eq!(reply.reasoning_content.as_deref(), Some("thinking about Explain X"));
        assert_eq!(reasoner_client.requests()[0].1, Model::Reasoner);
        assert_eq!(reasoner_client.requests()[0].2.len(), 4);

        let history = conversations.history(alice, conv).unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].reasoning_content, None);
        assert_eq!(
            history[4].reasoning_content.as_deref(),
            Some("thinking about Explain X")
        );
    }

    #[test]
    fn test_reasoner_without_trace_stores_absent() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conv = store
            .create_conversation(alice, "t", Model::Reasoner, None)
            .unwrap();

        let client = ScriptedClient::new(false);
        let reply = engine(&store, &client).send(alice, conv, "2+2?").unwrap();
        assert_eq!(reply.reasoning_content, None);
        assert_eq!(store.messages(conv).unwrap()[1].reasoning_content, None);
    }

    #[test]
    fn test_cross_user_send_denied_without_writes() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let bob = store.create_user("bob", "k2").unwrap();
        let conv = store
            .create_conversation(alice, "t", Model::Chat, Some("sys"))
            .unwrap();

        let client = ScriptedClient::new(false);
        let err = engine(&store, &client).send(bob, conv, "let me in").unwrap_err();
        assert!(matches!(err, ChatError::PermissionDenied { .. }));
        assert!(client.requests().is_empty());
        assert_eq!(store.messages(conv).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_conversation() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let client = ScriptedClient::new(false);
        assert!(matches!(
            engine(&store, &client).send(alice, 404, "hi"),
            Err(ChatError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remote_failure_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conv = store
            .create_conversation(alice, "t", Model::Chat, Some("sys"))
            .unwrap();

        let client = ScriptedClient::failing(402);
        let err = engine(&store, &client).send(alice, conv, "Hi").unwrap_err();
        assert!(matches!(
            err,
            ChatError::Remote(RemoteError::Status { status: 402, .. })
        ));
        assert_eq!(store.messages(conv).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_credentials_stop_before_dispatch() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "").unwrap();
        let conv = store.create_conversation(alice, "t", Model::Chat, None).unwrap();

        let client = ScriptedClient::new(false);
        assert!(matches!(
            engine(&store, &client).send(alice, conv, "Hi"),
            Err(ChatError::CredentialUnavailable(_))
        ));
        assert!(client.requests().is_empty());
        assert!(store.messages(conv).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_key_outranks_environment_on_every_turn() {
        let env = "SEEKCHAT_TEST_ENGINE_KEY_EXPLICIT_VS_ENV";
        std::env::set_var(env, "env-key");

        let store = Store::open_in_memory().unwrap();
        let resolver = CredentialResolver::new(&store, env, &NoPrompt);
        let (alice, _) = resolver.bootstrap("alice", Some("cli-key")).unwrap();
        let conv = store.create_conversation(alice, "t", Model::Chat, None).unwrap();

        let client = ScriptedClient::new(false);
        let engine = TurnEngine::new(&store, &client, resolver).with_api_key(Some("cli-key"));
        engine.send(alice, conv, "one").unwrap();
        engine.send(alice, conv, "two").unwrap();

        let keys: Vec<String> = client.requests().into_iter().map(|r| r.0).collect();
        assert_eq!(keys, vec!["cli-key", "cli-key"]);
        assert_eq!(store.get_user(alice).unwrap().api_key, "cli-key");
        std::env::remove_var(env);
    }

    #[test]
    fn test_environment_outranks_stored_key_at_send() {
        let env = "SEEKCHAT_TEST_ENGINE_KEY_ENV_VS_STORED";
        std::env::set_var(env, "env-key");

        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "stored-key").unwrap();
        let conv = store.create_conversation(alice, "t", Model::Chat, None).unwrap();

        let client = ScriptedClient::new(false);
        TurnEngine::new(&store, &client, CredentialResolver::new(&store, env, &NoPrompt))
            .send(alice, conv, "Hi")
            .unwrap();

        assert_eq!(client.requests()[0].0, "env-key");
        assert_eq!(store.get_user(alice).unwrap().api_key, "env-key");
        std::env::remove_var(env);
    }

    #[test]
    fn test_blank_explicit_key_falls_back_to_stored() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "stored-key").unwrap();
        let conv = store.create_conversation(alice, "t", Model::Chat, None).unwrap();

        let client = ScriptedClient::new(false);
        engine(&store, &client)
            .with_api_key(Some("  "))
            .send(alice, conv, "Hi")
            .unwrap();

        assert_eq!(client.requests()[0].0, "stored-key");
        assert_eq!(store.get_user(alice).unwrap().api_key, "stored-key");
    }

    #[test]
    fn test_applied_template_governs_next_turn() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conv = store
            .create_conversation(alice, "t", Model::Chat, Some("first"))
            .unwrap();
        let templates = TemplateManager::new(&store);
        let template = templates.create(alice, "second", "second prompt").unwrap();

        let client = ScriptedClient::new(false);
        let engine = engine(&store, &client);
        engine.send(alice, conv, "one").unwrap();
        templates.apply(alice, conv, template).unwrap();
        engine.send(alice, conv, "two").unwrap();

        let second_request = &client.requests()[1].2;
        assert_eq!(second_request[0], ChatMessage::system("second prompt"));
        assert_eq!(
            second_request
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
        assert_eq!(second_request.last(), Some(&ChatMessage::user("two")));
        // Both system rows stay in the log
        assert_eq!(store.messages(conv).unwrap().len(), 6);
    }

    #[test]
    fn test_empty_user_text_is_stored() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conv = store.create_conversation(alice, "t", Model::Chat, None).unwrap();

        let client = ScriptedClient::new(false);
        engine(&store, &client).send(alice, conv, "").unwrap();
        let history = store.messages(conv).unwrap();
        assert_eq!(history[0].content, "");
        assert_eq!(history[0].role, Role::User);
    }

    #[test]
    fn test_concurrent_turns_on_separate_conversations() {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice", "k1").unwrap();
        let conversations: Vec<i64> = (0..4)
            .map(|i| {
                store
                    .create_conversation(alice, &format!("c{i}"), Model::Chat, Some("sys"))
                    .unwrap()
            })
            .collect();

        std::thread::scope(|scope| {
            for &conv in &conversations {
                let store = &store;
                scope.spawn(move || {
                    let client = ScriptedClient::new(false);
                    let engine = engine(store, &client);
                    for turn in 0..5 {
                        engine
                            .send(alice, conv, &format!("{conv}-{turn}"))
                            .unwrap();
                    }
                });
            }
        });

        for conv in conversations {
            let history = store.messages(conv).unwrap();
            assert_eq!(history.len(), 11);
            for (turn, pair) in history[1..].chunks(2).enumerate() {
                assert_eq!(pair[0].content, format!("{conv}-{turn}"));
                assert_eq!(pair[1].content, format!("reply to {conv}-{turn}"));
            }
        }
    }
}

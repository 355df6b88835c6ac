pub mod cli;
pub mod config;
pub mod conversations;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod remote;
pub mod store;
pub mod templates;
pub mod types;

pub use config::Config;
pub use conversations::ConversationManager;
pub use credentials::{CredentialResolver, KeyPrompt, NoPrompt};
pub use engine::{outbound_messages, Reply, TurnEngine};
pub use error::{ChatError, Result};
pub use remote::{ChatMessage, Completion, CompletionClient, DeepSeekClient, RemoteError};
pub use store::{ListOrder, Store};
pub use templates::TemplateManager;
pub use types::{Model, Role};

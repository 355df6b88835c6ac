use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use seekchat::cli::chat::{self, ChatOptions};
use seekchat::cli::conversation::{self, NewConversation};
use seekchat::cli::{init_logging, send, template, user, StdinPrompt};
use seekchat::config::Config;
use seekchat::credentials::CredentialResolver;
use seekchat::engine::TurnEngine;
use seekchat::remote::DeepSeekClient;
use seekchat::store::Store;
use seekchat::types::Model;

#[derive(Parser)]
#[command(name = "seekchat")]
#[command(about = "Persistent DeepSeek conversations from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = "seekchat.yaml")]
    config: String,

    /// Database file (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User to act as
    #[arg(short, long, global = true, default_value = "default_user")]
    user: String,

    /// API key; stored for the user when given
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Conversation management
    Conv {
        #[command(subcommand)]
        command: ConvCommands,
    },

    /// Send one message and print the reply
    Send {
        /// Conversation ID
        conversation: i64,
        /// Message text
        text: String,
    },

    /// Prompt template management
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Interactive chat
    Chat {
        /// Continue an existing conversation instead of starting one
        #[arg(long)]
        conversation: Option<i64>,
        /// Model for a new conversation (deepseek-chat, deepseek-reasoner)
        #[arg(short, long)]
        model: Option<Model>,
        /// Title for a new conversation
        #[arg(short, long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register the user, or refresh its stored key
    Register,
    /// Replace the stored API key
    SetKey {
        /// New API key
        key: String,
    },
    /// Show the user record
    Show,
}

#[derive(Subcommand)]
enum ConvCommands {
    /// Create a conversation
    New {
        /// Conversation title
        title: String,
        /// Model (deepseek-chat, deepseek-reasoner)
        #[arg(short, long)]
        model: Option<Model>,
        /// System prompt (defaults to the configured one)
        #[arg(short, long)]
        system: Option<String>,
        /// Seed the system prompt from a template
        #[arg(long, conflicts_with = "system")]
        template: Option<i64>,
        /// Start without any system prompt
        #[arg(long, conflicts_with_all = ["system", "template"])]
        no_system: bool,
    },
    /// List conversations, newest first
    List {
        /// Oldest first instead
        #[arg(long)]
        oldest_first: bool,
    },
    /// Delete a conversation and its messages
    Delete {
        /// Conversation ID
        id: i64,
    },
    /// Switch the model of a conversation
    Model {
        /// Conversation ID
        id: i64,
        /// deepseek-chat or deepseek-reasoner
        model: Model,
    },
    /// Replace the system prompt of a conversation
    Prompt {
        /// Conversation ID
        id: i64,
        /// New system prompt
        text: String,
    },
    /// Show a conversation's messages
    History {
        /// Conversation ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Save a prompt template
    New {
        /// Template name (unique per user)
        name: String,
        /// Prompt text
        content: String,
    },
    /// List templates
    List,
    /// Delete a template
    Delete {
        /// Template ID
        id: i64,
    },
    /// Apply a template to a conversation
    Apply {
        /// Template ID
        template: i64,
        /// Conversation ID
        conversation: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    // Load config
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        warn!("ignoring unreadable config: {:#}", e);
        Config::default()
    });

    // Initialize store
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    let store = Store::open(&db_path)?;

    let prompt = StdinPrompt;
    let resolver = CredentialResolver::new(&store, &config.api.key_env, &prompt);

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Register => {
                user::register(&resolver, &cli.user, cli.api_key.as_deref())?;
            }
            UserCommands::SetKey { key } => {
                user::set_key(&store, &cli.user, &key)?;
            }
            UserCommands::Show => {
                user::show(&store, &cli.user)?;
            }
        },
        Commands::Conv { command } => {
            let user_id = user::lookup(&store, &cli.user)?;
            match command {
                ConvCommands::New {
                    title,
                    model,
                    system,
                    template,
                    no_system,
                } => {
                    let system_prompt = if no_system {
                        None
                    } else {
                        Some(system.as_deref().unwrap_or(&config.defaults.system_prompt))
                    };
                    conversation::create(
                        &store,
                        user_id,
                        NewConversation {
                            title: &title,
                            model: model.unwrap_or(config.defaults.model),
                            system_prompt,
                            template,
                        },
                    )?;
                }
                ConvCommands::List { oldest_first } => {
                    conversation::list(&store, user_id, oldest_first)?;
                }
                ConvCommands::Delete { id } => {
                    conversation::delete(&store, user_id, id)?;
                }
                ConvCommands::Model { id, model } => {
                    conversation::set_model(&store, user_id, id, model)?;
                }
                ConvCommands::Prompt { id, text } => {
                    conversation::set_prompt(&store, user_id, id, &text)?;
                }
                ConvCommands::History { id } => {
                    conversation::history(&store, user_id, id)?;
                }
            }
        }
        Commands::Template { command } => {
            let user_id = user::lookup(&store, &cli.user)?;
            match command {
                TemplateCommands::New { name, content } => {
                    template::create(&store, user_id, &name, &content)?;
                }
                TemplateCommands::List => {
                    template::list(&store, user_id)?;
                }
                TemplateCommands::Delete { id } => {
                    template::delete(&store, user_id, id)?;
                }
                TemplateCommands::Apply {
                    template: template_id,
                    conversation,
                } => {
                    template::apply(&store, user_id, template_id, conversation)?;
                }
            }
        }
        Commands::Send { conversation, text } => {
            let (user_id, _) = resolver.bootstrap(&cli.user, cli.api_key.as_deref())?;
            let client = DeepSeekClient::new(&config.api.base_url)?;
            let engine = TurnEngine::new(
                &store,
                &client,
                CredentialResolver::new(&store, &config.api.key_env, &prompt),
            )
            .with_api_key(cli.api_key.as_deref());
            send::run(&engine, user_id, conversation, &text)?;
        }
        Commands::Chat {
            conversation,
            model,
            title,
        } => {
            let (user_id, _) = resolver.bootstrap(&cli.user, cli.api_key.as_deref())?;
            let client = DeepSeekClient::new(&config.api.base_url)?;
            let engine = TurnEngine::new(
                &store,
                &client,
                CredentialResolver::new(&store, &config.api.key_env, &prompt),
            )
            .with_api_key(cli.api_key.as_deref());
            chat::run(
                &store,
                &engine,
                user_id,
                ChatOptions {
                    model: model.unwrap_or(config.defaults.model),
                    conversation,
                    title: title.as_deref().unwrap_or(&config.defaults.title),
                    system_prompt: &config.defaults.system_prompt,
                },
            )?;
        }
    }

    Ok(())
}

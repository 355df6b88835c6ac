//! Interactive chat loop
//!
//! Plain lines are sent as turns; lines starting with `/` are commands.

use anyhow::{anyhow, Result};
use std::io::{self, BufRead, Write};

use super::print_history;
use super::send::print_reply;
use crate::conversations::ConversationManager;
use crate::engine::TurnEngine;
use crate::store::Store;
use crate::templates::TemplateManager;
use crate::types::Model;

const HELP: &str = r#"
Commands:
  /help                   Show this help
  /quit                   Leave the chat
  /model                  Toggle between deepseek-chat and deepseek-reasoner
  /prompt <text>          Set the system prompt of this conversation
  /newprompt <name> <text> Save a prompt template
  /prompts                List your prompt templates
  /useprompt <id>         Apply a prompt template to this conversation
  /history                Show this conversation's history
  /clear                  Clear the screen
  /new                    Start a new conversation
"#;

#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Help,
    Quit,
    ToggleModel,
    Prompt(&'a str),
    NewPrompt(&'a str),
    Prompts,
    UsePrompt(&'a str),
    History,
    Clear,
    New,
    Unknown(&'a str),
}

impl<'a> ChatCommand<'a> {
    /// Returns `None` for ordinary chat input
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let command = match head.to_lowercase().as_str() {
            "/help" => ChatCommand::Help,
            "/quit" | "/exit" => ChatCommand::Quit,
            "/model" => ChatCommand::ToggleModel,
            "/prompt" => ChatCommand::Prompt(rest),
            "/newprompt" => ChatCommand::NewPrompt(rest),
            "/prompts" => ChatCommand::Prompts,
            "/useprompt" => ChatCommand::UsePrompt(rest),
            "/history" => ChatCommand::History,
            "/clear" => ChatCommand::Clear,
            "/new" => ChatCommand::New,
            _ => ChatCommand::Unknown(head),
        };
        Some(command)
    }
}

pub struct ChatOptions<'a> {
    pub model: Model,
    pub conversation: Option<i64>,
    pub title: &'a str,
    pub system_prompt: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatLoop<'a> {
    conversations: ConversationManager<'a>,
    templates: TemplateManager<'a>,
    engine: &'a TurnEngine<'a>,
    user_id: i64,
    conversation_id: i64,
    options: ChatOptions<'a>,
}

pub fn run(store: &Store, engine: &TurnEngine, user_id: i64, options: ChatOptions) -> Result<()> {
    let mut chat = ChatLoop::new(store, engine, user_id, options)?;

    println!("{}", HELP);
    chat.print_status()?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("User: ");
        io::stdout().flush()?;

        let Some(line) = read_line(&mut input)? else {
            break;
        };

        let flow = match ChatCommand::parse(&line) {
            Some(command) => chat.handle(command, &mut input),
            None => chat.send(&line).map(|_| Flow::Continue),
        };

        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            // Keep the session alive; the failed turn left nothing behind
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    println!("Bye!");
    Ok(())
}

fn read_line(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

impl<'a> ChatLoop<'a> {
    /// Resume `options.conversation`, or start a new one with the default prompt
    fn new(
        store: &'a Store,
        engine: &'a TurnEngine<'a>,
        user_id: i64,
        options: ChatOptions<'a>,
    ) -> Result<Self> {
        let conversations = ConversationManager::new(store);
        let conversation_id = match options.conversation {
            Some(id) => conversations.get(user_id, id)?.conversation_id,
            None => conversations.create(
                user_id,
                options.title,
                options.model,
                Some(options.system_prompt),
            )?,
        };

        Ok(Self {
            conversations,
            templates: TemplateManager::new(store),
            engine,
            user_id,
            conversation_id,
            options,
        })
    }

    fn print_status(&self) -> Result<()> {
        let conversation = self.conversations.get(self.user_id, self.conversation_id)?;
        println!(
            "Conversation {} | model {}",
            conversation.conversation_id, conversation.model
        );
        Ok(())
    }

    fn send(&self, text: &str) -> Result<()> {
        let reply = self.engine.send(self.user_id, self.conversation_id, text)?;
        print_reply(&reply);
        println!();
        Ok(())
    }

    fn handle(&mut self, command: ChatCommand, input: &mut impl BufRead) -> Result<Flow> {
        match command {
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Quit => return Ok(Flow::Quit),
            ChatCommand::ToggleModel => {
                let current = self.conversations.get(self.user_id, self.conversation_id)?.model;
                let next = current.toggled();
                self.conversations
                    .set_model(self.user_id, self.conversation_id, next)?;
                self.options.model = next;
                println!("Switched to {}", next);
            }
            ChatCommand::Prompt("") => println!("Usage: /prompt <text>"),
            ChatCommand::Prompt(text) => {
                self.conversations
                    .set_system_prompt(self.user_id, self.conversation_id, text)?;
                println!("System prompt set: {}", text);
            }
            ChatCommand::NewPrompt(args) => {
                let (name, content) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("Usage: /newprompt <name> <text>"))?;
                let id = self.templates.create(self.user_id, name, content.trim())?;
                println!("Template '{}' created with ID: {}", name, id);
            }
            ChatCommand::Prompts => self.print_templates()?,
            ChatCommand::UsePrompt(arg) => {
                let template_id: i64 = arg
                    .parse()
                    .map_err(|_| anyhow!("Usage: /useprompt <template id>"))?;
                self.templates
                    .apply(self.user_id, self.conversation_id, template_id)?;
                let template = self.templates.get(self.user_id, template_id)?;
                println!("Using template '{}'", template.name);
            }
            ChatCommand::History => {
                let messages = self.conversations.history(self.user_id, self.conversation_id)?;
                println!();
                print_history(&messages);
                println!();
            }
            ChatCommand::Clear => {
                // ANSI: erase display, cursor home
                print!("\x1B[2J\x1B[1;1H");
                println!("{}", HELP);
                self.print_status()?;
            }
            ChatCommand::New => self.start_new(input)?,
            ChatCommand::Unknown(head) => println!("Unknown command {}. Type /help.", head),
        }
        Ok(Flow::Continue)
    }

    fn print_templates(&self) -> Result<()> {
        let templates = self.templates.list(self.user_id)?;
        if templates.is_empty() {
            println!("No templates yet. Create one with /newprompt.");
            return Ok(());
        }

        for t in templates {
            println!("ID: {}, name: {}", t.template_id, t.name);
            println!("{}", t.content);
            println!("{}", "-".repeat(40));
        }
        Ok(())
    }

    /// Start a fresh conversation, optionally seeded from a template
    fn start_new(&mut self, input: &mut impl BufRead) -> Result<()> {
        let templates = self.templates.list(self.user_id)?;
        let mut chosen = None;

        if !templates.is_empty() {
            for t in &templates {
                println!("ID: {}, name: {}", t.template_id, t.name);
            }
            print!("Template ID (Enter for the default prompt): ");
            io::stdout().flush()?;

            let answer = read_line(input)?.unwrap_or_default();
            let answer = answer.trim();
            if !answer.is_empty() {
                match answer.parse::<i64>() {
                    Ok(id) => chosen = Some(id),
                    Err(_) => println!("Invalid template ID, using the default prompt"),
                }
            }
        }

        let (user_id, title, model) = (self.user_id, self.options.title, self.options.model);
        let created = match chosen {
            Some(template_id) => self
                .conversations
                .create_from_template(user_id, title, model, template_id)
                .or_else(|e| {
                    println!("Could not use template: {}. Using the default prompt.", e);
                    self.conversations
                        .create(user_id, title, model, Some(self.options.system_prompt))
                })?,
            None => self
                .conversations
                .create(user_id, title, model, Some(self.options.system_prompt))?,
        };

        self.conversation_id = created;
        self.print_status()
    }
}

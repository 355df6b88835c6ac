//! One-shot send command

use anyhow::Result;

use crate::engine::{Reply, TurnEngine};

pub fn run(engine: &TurnEngine, user_id: i64, conversation_id: i64, text: &str) -> Result<()> {
    let reply = engine.send(user_id, conversation_id, text)?;
    print_reply(&reply);
    Ok(())
}

pub(crate) fn print_reply(reply: &Reply) {
    if let Some(reasoning) = &reply.reasoning_content {
        println!("💭 [Reasoning]\n{}\n", reasoning);
    }
    println!("AI: {}", reply.content);
}

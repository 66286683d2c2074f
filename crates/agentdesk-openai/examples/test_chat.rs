// Test Chat Example
//
// Creates an agent in an in-memory collection, follows the collection live,
// then chats with the agent through OpenAI from stdin.
//
// Run with: OPENAI_API_KEY=sk-... cargo run -p agentdesk-openai --example test_chat

use agentdesk_core::{
    memory::InMemoryDocumentStore, AgentPayload, AgentStatus, ChatSession, CollectionSync,
    DeskConfig, TurnAssembler,
};
use agentdesk_openai::OpenAiTransport;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DeskConfig::from_env()?;

    let store = Arc::new(InMemoryDocumentStore::new());
    let agents = CollectionSync::new(store);

    let _subscription = agents.subscribe(
        |records| {
            let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
            tracing::info!(agents = ?names, "agent list updated");
        },
        |err| tracing::warn!(error = %err, "agent list unavailable"),
    );

    let agent_id = agents
        .create(
            &AgentPayload::new("Concierge", "A polite hotel concierge")
                .with_system_prompt(
                    "You are a polite hotel concierge. Answer in two sentences at most.",
                )
                .with_status(AgentStatus::Active),
        )
        .await?;

    let assembler = Arc::new(TurnAssembler::new(Arc::new(OpenAiTransport::from_config(
        &config,
    ))));
    let mut session = ChatSession::open(
        &agents,
        &agent_id,
        assembler,
        config.api_key.clone(),
        config.completion.clone(),
    )
    .await?;

    println!("Chatting with {} (empty line to quit)", session.agent().name);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        if let Some(reply) = session.send(line.trim_end()).await {
            println!("[{}] {}", reply.turn.display_time(), reply.turn.text);
        }
    }

    Ok(())
}

use conversation_history::{
    memory::TranscriptSummarizer, model_fn, store::build_store, ContextConfig, HistoryConfig,
    HistoryManager, KeepLast, Message, Role, TokenBudget, Usage,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stand-in model: recalls a name introduced earlier in the context
async fn scripted_model(context: Vec<Message>) -> conversation_history::Result<Message> {
    let last = context.last().map(|m| m.content().to_lowercase()).unwrap_or_default();

    let name = context
        .iter()
        .filter(|m| m.role() == Role::User || m.is_summary())
        .find_map(|m| {
            m.content()
                .split("I'm ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .map(|word| word.trim_end_matches(|c: char| !c.is_alphanumeric()).to_string())
        });

    let reply = if last.contains("summar") {
        match &name {
            Some(name) => format!("The user introduced themselves as {}.", name),
            None => "Small talk, no facts worth keeping.".to_string(),
        }
    } else if last.contains("name") {
        match &name {
            Some(name) => format!("Your name is {}.", name),
            None => "I don't know your name yet.".to_string(),
        }
    } else {
        "Noted.".to_string()
    };

    let prompt_tokens = context.iter().map(|m| m.token_count() as u64).sum();
    let completion_tokens = (reply.len() as u64 + 3) / 4;
    let cost = (prompt_tokens + completion_tokens) as f64 * 0.000_002;

    Ok(Message::assistant(reply).with_usage(Usage::new(prompt_tokens, completion_tokens, cost)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HistoryConfig::from_env()?;
    info!(
        turn_timeout = ?config.turn_timeout,
        summarize_timeout = ?config.summarize_timeout,
        "Conversation history demo starting"
    );

    let store = build_store(&config);
    let manager = HistoryManager::with_config(store, config);
    let model = model_fn(scripted_model);
    let session = "demo:nemo";

    manager.clear(session).await?;
    manager.append(session, Message::user("Hi I'm Nemo")).await?;

    let outcome = manager
        .run_turn(session, Message::user("What's my name?"), &model, None)
        .await?;
    println!("\n=== TURN 1 ===");
    println!("Assistant: {}", outcome.response.content());

    for chatter in ["I like the ocean", "Tell me about reefs", "And about currents"] {
        manager
            .run_turn(session, Message::user(chatter), &model, Some(&KeepLast::new(6)))
            .await?;
    }
    println!("\n=== AFTER TRUNCATING TO 6 + 2 ===");
    println!("{} messages kept", manager.len(session).await?);

    let budget = TokenBudget::new(
        TranscriptSummarizer::new(model_fn(scripted_model)),
        ContextConfig {
            max_context_tokens: 40,
            summarization_threshold: 0.5,
            min_messages_to_keep: 2,
            preserve_recent_count: 2,
        },
    );
    let outcome = manager
        .run_turn(session, Message::user("Do you still know my name?"), &model, Some(&budget))
        .await?;

    println!("\n=== AFTER TOKEN-BUDGET SUMMARY ===");
    for msg in &outcome.history {
        let tag = if msg.is_summary() { " [summary]" } else { "" };
        println!("  {}{}: {}", msg.role(), tag, msg.content());
    }

    let totals = manager.usage(session).await?;
    println!("\n=== USAGE ===");
    println!("Responses reporting usage: {}", totals.reporting_messages);
    println!("Prompt tokens: {}", totals.usage.prompt_tokens);
    println!("Completion tokens: {}", totals.usage.completion_tokens);
    println!("Total tokens: {}", totals.usage.total_tokens);
    println!("Estimated cost: ${:.6}", totals.usage.cost_usd);

    Ok(())
}

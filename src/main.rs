use paper_agents::config::{ProviderConfig, SubstrateConfig};
use paper_agents::{AgentKind, AgentTask, Substrate};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let substrate = Substrate::builder()
        .config(SubstrateConfig::builder().local_provider_enabled(true).build())
        .openai(ProviderConfig::openai_defaults(std::env::var("OPENAI_API_KEY").ok()))
        .anthropic(ProviderConfig::anthropic_defaults(std::env::var("ANTHROPIC_API_KEY").ok()))
        .perplexity(ProviderConfig::perplexity_defaults(std::env::var("PERPLEXITY_API_KEY").ok()))
        .build();

    let task = AgentTask::new(
        AgentKind::Summarizer,
        json!({
            "paperId": "demo-0001",
            "textContent": "This paper presents a new method for graph neural \
                network training that reduces memory usage by 40% while \
                preserving accuracy on citation benchmarks.",
            "summaryType": "standard",
        }),
    );

    let result = substrate.submit(task).await;

    println!("success: {}", result.success);
    if let Some(value) = &result.result {
        println!("result: {value}");
    }
    if let Some(message) = &result.error_message {
        println!("error: {message}");
    }
    println!("used_fallback: {}", result.used_fallback);
    println!("duration: {:?}", result.duration);

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use kb_chatbot::bedrock::BedrockClient;
use kb_chatbot::chat::{build_answer, ChatService};
use kb_chatbot::config::AppConfig;
use kb_chatbot::models::{ChatAnswer, ChatRequest, GenerationResult};
use kb_chatbot::render::{preview, source_file_name};

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Ask the knowledge base a question and print the answer with its citations")]
struct Cli {
    /// Question to send to the retrieve-and-generate service.
    #[arg(long, conflicts_with = "from_json", required_unless_present = "from_json")]
    question: Option<String>,
    /// Reconcile a saved retrieve-and-generate response instead of calling the service.
    #[arg(long)]
    from_json: Option<PathBuf>,
    /// Print the full answer as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let answer = match (&cli.from_json, cli.question) {
        (Some(path), _) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed reading {}", path.display()))?;
            let result: GenerationResult = serde_json::from_str(&raw)
                .with_context(|| format!("invalid generation JSON in {}", path.display()))?;
            build_answer(&result, 0)
        }
        (None, Some(question)) => {
            let config = AppConfig::from_env();
            let client = BedrockClient::new(config.bedrock.clone());
            let chat = ChatService::new(config, client, Arc::new(Semaphore::new(1)));
            chat.answer(ChatRequest { question }).await?
        }
        (None, None) => anyhow::bail!("either --question or --from-json is required"),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    Ok(())
}

fn print_answer(answer: &ChatAnswer) {
    println!("{}", answer.answer_text);
    println!();

    if let Some(notice) = &answer.notice {
        println!("{notice}");
        return;
    }

    for citation in &answer.citations {
        println!(
            "Citation #{} (positions {}-{}): \"{}\"",
            citation.citation_index,
            citation.span_start,
            citation.span_end,
            preview(&citation.cited_text, 80)
        );
        for (idx, reference) in citation.references.iter().enumerate() {
            println!(
                "  [{}] {} ({})",
                idx + 1,
                source_file_name(&reference.source),
                reference.source
            );
            println!("      {}", preview(&reference.content.replace('\n', " "), 150));
        }
    }

    println!();
    println!("Sources:");
    for source in &answer.sources {
        println!("  - {source}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

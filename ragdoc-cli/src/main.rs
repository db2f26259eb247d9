use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use ragdoc::{
    Answer, Answerer, Document, IngestReport, IngestionPipeline, PromptVariant, RagConfig,
    build_completion_provider, build_embedding_provider, build_vector_store,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "ragdoc")]
#[command(about = "Ask questions about your documents and get cited answers", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Split, embed, and store one or more .txt, .md, or .pdf files")]
    Ingest {
        #[arg(required = true, help = "Files to ingest")]
        files: Vec<PathBuf>,
    },

    #[command(about = "Answer a question from the ingested documents")]
    Ask {
        #[arg(help = "The question to answer")]
        question: String,

        #[arg(short, help = "Number of chunks to retrieve (defaults to TOP_K)")]
        k: Option<usize>,

        #[arg(long, help = "Prompt template: default or strict (defaults to PROMPT)")]
        prompt: Option<PromptVariant>,
    },

    #[command(about = "Show which vector store is configured and whether it can be queried")]
    Status,
}

#[derive(Serialize)]
struct Status {
    backend: String,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_count: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result = match ragdoc_telemetry::init_telemetry("ragdoc") {
        Ok(()) => run(cli).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_report(&e));
            ExitCode::FAILURE
        }
    }
}

/// One line naming the error and every cause under it.
fn error_report(error: &anyhow::Error) -> String {
    format!("error: {error:#}")
}

async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Ingest { files } => handle_ingest(&config, &files, cli.json).await,
        Commands::Ask { question, k, prompt } => {
            let k = k.unwrap_or(config.top_k);
            let prompt = prompt.unwrap_or(config.prompt);
            handle_ask(&config, &question, k, prompt, cli.json).await
        }
        Commands::Status => handle_status(&config, cli.json).await,
    }
}

async fn handle_ingest(config: &RagConfig, files: &[PathBuf], json: bool) -> Result<()> {
    let embedder = build_embedding_provider(config)?;
    let store = build_vector_store(config, embedder.as_ref()).await?;
    let pipeline = IngestionPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .build()?;

    for path in files {
        let name = upload_name(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document = Document::from_upload(name.clone(), bytes)?;
        let report = pipeline.ingest(&document).await?;
        print_report(&name, &report, json)?;
    }
    Ok(())
}

async fn handle_ask(
    config: &RagConfig,
    question: &str,
    k: usize,
    prompt: PromptVariant,
    json: bool,
) -> Result<()> {
    let embedder = build_embedding_provider(config)?;
    let store = build_vector_store(config, embedder.as_ref()).await?;
    let answerer = Answerer::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .completion_provider(build_completion_provider(config)?)
        .build()?;

    let answer = answerer.answer_question(question, k, prompt).await?;
    print_answer(&answer, json)
}

async fn handle_status(config: &RagConfig, json: bool) -> Result<()> {
    let embedder = build_embedding_provider(config)?;
    let store = build_vector_store(config, embedder.as_ref()).await?;

    let available = store.is_available().await;
    let chunk_count = if available { store.count().await.ok() } else { None };
    let status = Status { backend: store.backend().to_string(), available, chunk_count };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Vector store: {}", status.backend);
        println!("Available:    {}", if status.available { "yes" } else { "no" });
        match status.chunk_count {
            Some(count) => println!("Chunks:       {count}"),
            None => println!("Chunks:       n/a"),
        }
    }
    Ok(())
}

/// The file name recorded as the `source` of every chunk.
fn upload_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))
}

fn print_report(name: &str, report: &IngestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("Ingested {} chunks from {name} ({})", report.chunk_count, report.backend);
    }
    Ok(())
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }

    println!("{}", answer.text);
    if answer.sources.is_empty() {
        return Ok(());
    }
    println!("\nSources:");
    for source in &answer.sources {
        match source.page {
            Some(page) => {
                println!("- {} (page={page}) | chunk_id={}", source.source, source.chunk_id)
            }
            None => println!("- {} | chunk_id={}", source.source, source.chunk_id),
        }
        println!("    {}", source.preview.replace('\n', " "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_overrides() {
        let args = ["ragdoc", "ask", "Why?", "-k", "2", "--prompt", "strict", "--json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Ask { question, k, prompt } => {
                assert_eq!(question, "Why?");
                assert_eq!(k, Some(2));
                assert_eq!(prompt, Some(PromptVariant::Strict));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn ingest_requires_a_file() {
        assert!(Cli::try_parse_from(["ragdoc", "ingest"]).is_err());
        assert!(Cli::try_parse_from(["ragdoc", "ask", "q", "--prompt", "creative"]).is_err());
    }

    #[test]
    fn upload_name_is_the_file_name() {
        assert_eq!(upload_name(Path::new("/tmp/docs/report.pdf")).unwrap(), "report.pdf");
        assert!(upload_name(Path::new("/")).is_err());
    }

    #[test]
    fn errors_are_reported_once_with_their_causes() {
        let cause = ragdoc::RagError::Config("top_k must be greater than zero".into());
        let error = anyhow::Error::new(cause).context("invalid configuration");
        let report = error_report(&error);
        assert_eq!(report.lines().count(), 1);
        assert!(report.starts_with("error: invalid configuration: "), "report was {report:?}");
        assert!(report.contains("top_k must be greater than zero"));
    }
}

//! Ciceron CLI - Command-line travel assistant for Japan and Spain.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ciceron_core::{
    ChatResponse, CiceronConfig, ClassifierKind, Degradation, Embedder, ImageIndex,
    IntentClassifier, PipelineOutcome,
};
use ciceron_embed::{OnnxCrossEncoder, OnnxEmbedder};
use ciceron_llm::{ChatClient, LlmGenerator, LlmIntentClassifier, LlmRewriter};
use ciceron_query::{
    ConversationMemory, InMemorySessionStore, KeywordIntentClassifier, PhraseGuardrail, Pipeline,
    PipelineBackends, SessionStore,
};
use ciceron_store::{Snapshot, SqliteCorpus};

/// CLIP text towers are trained on 77-token captions.
const CLIP_MAX_TOKENS: usize = 77;

const CHAT_SESSION: &str = "cli";

/// Ciceron - Grounded travel answers from Japan and Spain guides
#[derive(Parser)]
#[command(name = "ciceron")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/ciceron/config.toml, then ./ciceron.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Corpus database path (overrides the configuration)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        query: String,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation with memory (/reset, /quit)
    Chat,

    /// Load an ingested snapshot into the corpus
    Load {
        /// Snapshot JSON file
        snapshot: PathBuf,
    },

    /// Show corpus statistics
    Stats,

    /// Show the label the keyword router assigns to a query
    Route {
        /// Query to classify
        query: String,
    },
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn load_config(path: Option<&Path>) -> Result<CiceronConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => CiceronConfig::load(path)?,
        None => CiceronConfig::load_default()?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    match cli.command {
        Commands::Ask { query, json } => {
            let pipeline = build_pipeline(&config)?;
            ask(&pipeline, &config, &query, json).await?;
        }
        Commands::Chat => {
            let pipeline = build_pipeline(&config)?;
            chat(&pipeline, &config).await?;
        }
        Commands::Load { snapshot } => {
            load(&config, &snapshot)?;
        }
        Commands::Stats => {
            let corpus = open_corpus(&config)?;
            stats(&corpus)?;
        }
        Commands::Route { query } => {
            println!("{}", KeywordIntentClassifier::new().label(&query));
        }
    }

    Ok(())
}

fn open_corpus(config: &CiceronConfig) -> Result<SqliteCorpus, Box<dyn std::error::Error>> {
    let db_path = &config.database.path;
    if !db_path.exists() {
        eprintln!(
            "No corpus at {}. Run 'ciceron load <snapshot.json>' first, or specify a path with -d.",
            db_path.display()
        );
        std::process::exit(1);
    }
    Ok(SqliteCorpus::open(db_path, config.database.busy_timeout_ms)?)
}

/// Wire the configured backends into a pipeline.
fn build_pipeline(config: &CiceronConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let corpus = Arc::new(open_corpus(config)?);

    let embedder = Arc::new(OnnxEmbedder::from_config(&config.embedding)?);
    let cross_encoder = Arc::new(OnnxCrossEncoder::from_config(&config.reranker)?);

    let client = Arc::new(ChatClient::from_config(
        &config.llm,
        Duration::from_millis(config.timeouts.generate_ms),
    )?);
    let classifier: Arc<dyn IntentClassifier> = match config.llm.classifier {
        ClassifierKind::Keyword => Arc::new(KeywordIntentClassifier::new()),
        ClassifierKind::Llm => Arc::new(LlmIntentClassifier::new(
            client.clone(),
            config.llm.rewrite_model(),
        )),
    };

    let images: Option<Arc<dyn ImageIndex>> = if config.images.enabled {
        Some(corpus.clone())
    } else {
        None
    };

    let backends = PipelineBackends {
        guardrail: Arc::new(PhraseGuardrail::from_config(&config.guardrail)),
        rewriter: Arc::new(LlmRewriter::new(client.clone(), config.llm.rewrite_model())),
        classifier,
        lexical: corpus.clone(),
        vector: corpus.clone(),
        embedder,
        chunks: corpus.clone(),
        cross_encoder,
        images,
        image_embedder: image_embedder(config),
        generator: Arc::new(LlmGenerator::from_config(client, &config.llm)),
    };

    Ok(Pipeline::new(backends, config))
}

/// CLIP text encoder for image ranking, when configured and loadable.
fn image_embedder(config: &CiceronConfig) -> Option<Arc<dyn Embedder>> {
    if !config.images.enabled {
        return None;
    }
    let (model, tokenizer) = match (
        &config.images.text_model_path,
        &config.images.text_tokenizer_path,
    ) {
        (Some(model), Some(tokenizer)) => (model, tokenizer),
        _ => return None,
    };

    match OnnxEmbedder::new(
        model,
        tokenizer,
        "",
        config.images.dimension,
        CLIP_MAX_TOKENS,
        config.embedding.num_threads,
    ) {
        Ok(embedder) => Some(Arc::new(embedder)),
        Err(e) => {
            warn!(error = %e, "image text encoder unavailable, ranking images by chunk order");
            None
        }
    }
}

/// Cancel `token` on Ctrl-C until the returned handle is aborted.
fn cancel_on_ctrl_c(token: &CancellationToken) -> JoinHandle<()> {
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    })
}

async fn ask(
    pipeline: &Pipeline,
    config: &CiceronConfig,
    query: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);

    let mut memory = ConversationMemory::new(config.memory.max_turns);
    let outcome = pipeline.answer(query, &mut memory, &cancel).await;
    watcher.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    if !matches!(outcome, PipelineOutcome::Answered(_)) {
        std::process::exit(1);
    }
    Ok(())
}

async fn chat(
    pipeline: &Pipeline,
    config: &CiceronConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = InMemorySessionStore::new(config.memory.max_turns);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Cicerón: ¡Hola! Pregúntame sobre tu viaje a Japón o España. (/reset, /quit)");

    loop {
        eprint!("> ");

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                sessions.end(CHAT_SESSION).await?;
                println!("(memoria borrada)");
                continue;
            }
            query => {
                let cancel = CancellationToken::new();
                let watcher = cancel_on_ctrl_c(&cancel);
                let outcome = pipeline
                    .answer_in_session(&sessions, CHAT_SESSION, query, &cancel)
                    .await?;
                watcher.abort();
                print_outcome(&outcome);
                println!();
            }
        }
    }

    sessions.end(CHAT_SESSION).await?;
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::Answered(response) => print_response(response),
        PipelineOutcome::Denied { message, .. } => println!("{}", message),
        PipelineOutcome::Failed { message, reason } => {
            println!("{}", message);
            eprintln!("Error: {}", reason);
        }
        PipelineOutcome::Cancelled => eprintln!("(cancelado)"),
    }
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);
    println!();

    if !response.sources.is_empty() {
        println!("Fuentes: {}", response.sources.join(", "));
    }
    if let Some(n) = response.verified_sources {
        println!("Verificado con {} fuente(s)", n);
    }
    if let Some(image) = &response.image {
        println!("Imagen: {} ({})", image.path, image.description);
    }
    if !response.degraded.is_empty() {
        let kinds: Vec<String> = response.degraded.iter().map(degradation_kind).collect();
        eprintln!("Aviso: respuesta degradada [{}]", kinds.join(", "));
    }
}

fn degradation_kind(degradation: &Degradation) -> String {
    serde_json::to_value(degradation)
        .ok()
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(String::from))
        .unwrap_or_else(|| "unknown".to_string())
}

fn load(config: &CiceronConfig, snapshot_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let snapshot = Snapshot::from_path(snapshot_path)?;
    let corpus = SqliteCorpus::open(db_path, config.database.busy_timeout_ms)?;
    let report = corpus.load_snapshot(&snapshot)?;

    println!(
        "Loaded {} chunk(s), {} embedding(s), {} image(s) into {}",
        report.chunks,
        report.embeddings,
        report.images,
        db_path.display()
    );
    Ok(())
}

fn stats(corpus: &SqliteCorpus) -> Result<(), Box<dyn std::error::Error>> {
    let stats = corpus.get_stats()?;

    println!("Chunks:     {}", stats.chunks);
    println!("Embeddings: {}", stats.embeddings);
    println!("Images:     {}", stats.images);
    println!(
        "Storage:    {:.1} MB",
        stats.storage_bytes as f64 / (1024.0 * 1024.0)
    );
    for (country, count) in &stats.by_country {
        println!("  {:<12}{}", country, count);
    }
    Ok(())
}

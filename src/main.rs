use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quarry_core::Config;
use quarry_core::bootstrap::{
    create_embedder, create_multimodal_embedder, create_provider, create_retrieval_service,
    resolve_config_path,
};
use quarry_core::orchestrator::{ChatOrchestrator, ChatSettings};
use quarry_gateway::GatewayServer;
use quarry_index::{JsonlSink, MultimodalIndexer};
use quarry_ingest::{
    ContentCache, ExtractOptions, ExtractorRegistry, ItemOutcome, extract_folder,
};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "quarry", version)]
#[command(about = "Retrieval-augmented chat over a folder of text, PDF, and Excel documents")]
struct Cli {
    /// Configuration file (defaults to `QUARRY_CONFIG`, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the knowledge base and serve the HTTP API (default)
    Serve,
    /// Extract text and images from every PDF in a folder into the content cache
    Extract {
        folder: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Embed cached text and images with the joint text/image model
    EmbedExtracted {
        #[arg(long)]
        content_dir: Option<PathBuf>,
        #[arg(long)]
        sink: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Extract { folder, output } => extract(&config, &folder, output).await,
        Command::EmbedExtracted { content_dir, sink } => {
            embed_extracted(&config, content_dir, sink).await
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let provider = create_provider(&config.llm)?;
    let embedder = create_embedder(&config.embedding, &config.llm).await?;
    let retrieval = Arc::new(create_retrieval_service(&config, embedder)?);

    match retrieval.build().await {
        Ok(report) => {
            for item in report.items.skipped() {
                tracing::warn!(item = %item.item, "not indexed");
            }
        }
        Err(e) => tracing::error!("knowledge base unavailable: {e:#}"),
    }

    let orchestrator = Arc::new(ChatOrchestrator::new(
        provider,
        retrieval,
        ChatSettings::from(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::new(
        &config.server.bind,
        config.server.port,
        orchestrator,
        shutdown_rx,
    )
    .with_max_body_size(config.server.max_body_size)
    .serve()
    .await?;
    Ok(())
}

async fn extract(
    config: &Config,
    folder: &std::path::Path,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let registry = ExtractorRegistry::with_defaults(ExtractOptions {
        max_file_size: config.knowledge_base.max_file_size,
        skip_header: config.knowledge_base.skip_header,
        extract_images: true,
    });
    let cache = ContentCache::new(output.unwrap_or_else(|| config.multimodal.content_dir.clone()));

    let result = extract_folder(&registry, folder, &cache)
        .await
        .with_context(|| format!("failed to extract {}", folder.display()))?;

    if result.documents.is_empty() {
        println!("No PDF documents extracted from {}", folder.display());
    }
    for doc in &result.documents {
        println!(
            "{}: {} pages, {} images -> {}",
            doc.document,
            doc.pages,
            doc.images,
            doc.text_file.display()
        );
    }
    for item in result.report.skipped() {
        if let ItemOutcome::Skipped { reason } = &item.outcome {
            println!("skipped {}: {reason}", item.item);
        }
    }
    println!("Output: {}", cache.root().display());
    Ok(())
}

async fn embed_extracted(
    config: &Config,
    content_dir: Option<PathBuf>,
    sink: Option<PathBuf>,
) -> anyhow::Result<()> {
    let embedder = create_multimodal_embedder(&config.multimodal).await?;
    let sink = JsonlSink::new(sink.unwrap_or_else(|| config.multimodal.sink_path.clone()));
    let cache = ContentCache::new(
        content_dir.unwrap_or_else(|| config.multimodal.content_dir.clone()),
    );

    let indexer = MultimodalIndexer::new(embedder, sink, config.chunking.pdf)?;
    let report = indexer.run(&cache).await?;
    println!(
        "Embedded {} text chunks and {} images from {} documents ({} skipped)",
        report.text_chunks,
        report.images,
        report.documents,
        report.items.skipped_count()
    );
    Ok(())
}

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tutor_ai_embed::{EmbeddingProvider, FastEmbedProvider, ModelVariant};
use tutor_ai_search::{
    Concept, ConceptStore, RankingEngine, SearchCache, SearchConfig, SearchRequest, SourceType,
    SqliteConceptStore,
};

/// A CLI tool to index and search course concepts by meaning.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the concept database file
    #[arg(short, long, default_value = "concepts.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the concept database
    Init,
    /// Add or update a concept (embeds it and stores the vector)
    Add {
        /// Concept name
        name: String,
        /// Concept definition
        definition: String,
        /// Optional worked example
        #[arg(short, long)]
        example: Option<String>,
        /// Source type: official, teacher, or student
        #[arg(short, long, default_value = "official")]
        source: SourceType,
        /// Per-concept credibility override in [0, 1]
        #[arg(long)]
        credibility: Option<f32>,
        /// Model variant used to embed the concept
        #[arg(short, long, default_value = "default")]
        variant: ModelVariant,
    },
    /// Search concepts by semantic similarity
    Search {
        /// Free-text query
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Minimum similarity threshold (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Restrict to source types (repeatable)
        #[arg(short, long)]
        source: Vec<SourceType>,
        /// Model variant; must match the variant concepts were embedded with
        #[arg(short, long, default_value = "default")]
        variant: ModelVariant,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show database statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct DatabaseStats {
    variant: String,
    concept_count: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Init => {
            let _store = SqliteConceptStore::open(&args.database).await?;
            println!("Initialized concept database at {}", args.database.display());
            Ok(())
        }
        Commands::Add {
            name,
            definition,
            example,
            source,
            credibility,
            variant,
        } => {
            let store = SqliteConceptStore::open(&args.database).await?;
            let provider = FastEmbedProvider::new();

            let mut concept = Concept::new(name, definition, source);
            if let Some(example) = example {
                concept = concept.with_example(example);
            }
            if let Some(credibility) = credibility {
                if !(0.0..=1.0).contains(&credibility) {
                    return Err(anyhow::anyhow!(
                        "credibility must be in [0, 1], got {credibility}"
                    ));
                }
                concept = concept.with_credibility(credibility);
            }

            let embedding = provider.embed_text(&concept.embedding_text(), variant).await?;
            concept = concept.with_embedding(embedding);
            let name = concept.name.clone();

            let ids = store.upsert_concepts(vec![concept], variant).await?;
            println!("Stored concept '{name}' with id {} ({variant})", ids[0]);
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            threshold,
            source,
            variant,
            timeout,
            format,
        } => {
            let store = SqliteConceptStore::open(&args.database).await?;
            let engine = RankingEngine::new(
                Arc::new(FastEmbedProvider::new()),
                Arc::new(store),
                SearchConfig::default().with_variant(variant),
            );
            let cache = SearchCache::new(engine);

            let mut request = SearchRequest::new(query).with_limit(limit).with_variant(variant);
            if let Some(threshold) = threshold {
                request = request.with_threshold(threshold);
            }
            if !source.is_empty() {
                request = request.with_source_types(source);
            }
            if let Some(seconds) = timeout {
                request = request.with_timeout(Duration::from_secs(seconds));
            }

            let results = cache.search(&request).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} concepts:", results.len());
                    for result in results {
                        println!(
                            "  #{} {} | score: {:.3} (similarity {:.3} x {}) | {}",
                            result.rank,
                            result.name,
                            result.combined_score,
                            result.similarity,
                            result.source_type,
                            result.definition
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let store = SqliteConceptStore::open(&args.database).await?;

            let mut stats = Vec::new();
            for variant in ModelVariant::ALL {
                let count = store.concept_count(variant).await?;
                if count > 0 {
                    stats.push(DatabaseStats {
                        variant: variant.to_string(),
                        concept_count: count,
                    });
                }
            }

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary => {
                    println!("Database Statistics:");
                    if stats.is_empty() {
                        println!("  No concepts stored");
                    }
                    for entry in stats {
                        println!("  {}: {} concepts", entry.variant, entry.concept_count);
                    }
                }
            }
            Ok(())
        }
    }
}

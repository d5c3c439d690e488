//! `bitext` command line.
//!
//! ```bash
//! bitext align chapter.ru.txt chapter.zh.txt --config bitext.yaml
//! bitext chapter ch-01 --texts chapters/ --db alignments.db --novel novel-7
//! bitext chapter ch-02 --texts chapters/ --offline
//! bitext score answer.json chapter.ru.txt chapter.zh.txt
//! bitext split chapter.zh.txt --paragraphs
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bitext_core::{
    compute_metrics, parse_response, split_paragraphs, split_sentences, volume_integrity,
    AlignmentTemplate, RenderPayload,
};
use bitext_runtime::{
    AlignmentController, AlignmentOutcome, AlignmentService, AlignmentStore,
    CachedAlignmentStore, DirectoryTextSource, EngineConfig, ProviderRegistry,
    SqliteAlignmentStore, TemplateLibrary, TemplateSelector,
};

/// Align a chapter with its translation.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Align two text files and print the render payload
    Align {
        source: PathBuf,
        target: PathBuf,

        /// Alignment template (YAML or JSON); defaults to the built-in one
        #[arg(short, long, value_name = "FILE")]
        template: Option<PathBuf>,

        /// Skip the oracle and use the deterministic aligner
        #[arg(long)]
        offline: bool,

        /// Also print every attempt to stderr
        #[arg(long)]
        attempts: bool,
    },

    /// Align a stored chapter, reusing the persisted result when present
    Chapter {
        chapter_id: String,

        /// Directory holding `<id>.source.txt` and `<id>.target.txt`
        #[arg(long, value_name = "DIR")]
        texts: PathBuf,

        /// SQLite database for alignments
        #[arg(long, value_name = "FILE", default_value = "alignments.db")]
        db: PathBuf,

        /// Novel whose bound template is used
        #[arg(long, default_value = "default")]
        novel: String,

        /// Directory of extra templates
        #[arg(long, value_name = "DIR")]
        templates: Option<PathBuf>,

        /// Discard the stored alignment and compute a new one
        #[arg(long)]
        regenerate: bool,

        /// Align a missing chapter with the deterministic aligner
        #[arg(long)]
        offline: bool,
    },

    /// Score an oracle answer against the two texts
    Score {
        answer: PathBuf,
        source: PathBuf,
        target: PathBuf,

        /// Volume integrity threshold
        #[arg(long, default_value = "0.98")]
        threshold: f64,
    },

    /// Print the sentences (or paragraphs) of a text
    Split {
        file: PathBuf,

        #[arg(long)]
        paragraphs: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Align {
            source,
            target,
            template,
            offline,
            attempts,
        } => {
            let source_text = read_text(&source)?;
            let target_text = read_text(&target)?;

            let outcome = if offline {
                AlignmentController::align_offline(&source_text, &target_text)?
            } else {
                let template = match template {
                    Some(path) => AlignmentTemplate::from_file(&path)
                        .with_context(|| format!("loading template {}", path.display()))?,
                    None => bitext_runtime::prompts::default_template(),
                };
                let controller = build_controller(config)?;
                controller
                    .align(&source_text, &target_text, Some(&template))
                    .await?
            };

            if attempts {
                report_attempts(&outcome)?;
            }
            print_json(&RenderPayload::new(
                &outcome.result,
                &outcome.metrics,
                outcome.method,
            ))?;
        }
        Commands::Chapter {
            chapter_id,
            texts,
            db,
            novel,
            templates,
            regenerate,
            offline,
        } => {
            let mut library = TemplateLibrary::with_builtin();
            if let Some(dir) = templates {
                let loaded = library.load_dir(&dir)?;
                tracing::info!(loaded, dir = %dir.display(), "Loaded templates");
            }

            let store = SqliteAlignmentStore::open(&db)
                .with_context(|| format!("opening {}", db.display()))?;
            let store: Arc<dyn AlignmentStore> =
                Arc::new(CachedAlignmentStore::from_config(store, &config.cache));

            // A stored alignment is served without configuring a provider
            let stored = if regenerate {
                None
            } else {
                store.get(&chapter_id).await?
            };
            let entry = match stored {
                Some(entry) => entry,
                None => {
                    let texts = Arc::new(DirectoryTextSource::new(texts));
                    let service = if offline {
                        AlignmentService::offline(texts, Arc::new(library), store)
                    } else {
                        let controller = build_controller(config)?;
                        AlignmentService::new(texts, Arc::new(library), controller, store)
                    };

                    let selector = TemplateSelector::Novel(novel);
                    if regenerate {
                        service.regenerate(&chapter_id, &selector).await?
                    } else {
                        service.get_or_align(&chapter_id, &selector).await?
                    }
                }
            };
            print_json(&entry.render())?;
        }
        Commands::Score {
            answer,
            source,
            target,
            threshold,
        } => {
            let raw = read_text(&answer)?;
            let source_text = read_text(&source)?;
            let target_text = read_text(&target)?;

            let result = parse_response(&raw)?;
            let metrics = compute_metrics(&result, &source_text, &target_text);
            let volume = volume_integrity(&result, &source_text, &target_text, threshold);
            let gate_passed = config.gate.passes(&metrics);
            let volume_passed = volume.passed();

            print_json(&serde_json::json!({
                "metrics": metrics,
                "gate_passed": gate_passed,
                "volume": volume,
                "volume_passed": volume_passed,
            }))?;
        }
        Commands::Split { file, paragraphs } => {
            let text = read_text(&file)?;
            let segments = if paragraphs {
                split_paragraphs(&text)
            } else {
                split_sentences(&text)
            };
            for segment in segments {
                println!("{}", segment);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn build_controller(config: EngineConfig) -> Result<AlignmentController> {
    let provider = ProviderRegistry::with_defaults()
        .create(&config.model.provider, &config.model.provider_config())
        .with_context(|| format!("configuring provider {}", config.model.provider))?;
    Ok(AlignmentController::new(provider, config))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn report_attempts(outcome: &AlignmentOutcome) -> Result<()> {
    for record in &outcome.attempts {
        eprintln!("{}", serde_json::to_string(record)?);
    }
    if let Some(reason) = &outcome.fallback_reason {
        eprintln!("fallback: {}", reason);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

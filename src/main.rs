use ai_video_shorts::api::RunwayTransport;
use ai_video_shorts::api::openai;
use ai_video_shorts::config::Config;
use ai_video_shorts::profile::{AssetKind, ProfileCatalog, build_profile_context};
use ai_video_shorts::{GenerationOrchestrator, ProfileLookup, init, prompt, tags};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Tag-driven AI short video generator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.json
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a video from a tagged synopsis
    Generate {
        /// Synopsis file containing @char / @back tags
        #[arg(short, long)]
        synopsis: PathBuf,
        /// English prompt; when omitted it is produced by the chat model
        #[arg(short, long)]
        prompt: Option<String>,
        /// File holding the prompt (an ENG block is extracted if present)
        #[arg(long, conflicts_with = "prompt")]
        prompt_file: Option<PathBuf>,
        /// Output video path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Split a synopsis into cuts with the chat model
    Cuts {
        #[arg(short, long)]
        synopsis: PathBuf,
    },
    /// Show the tags, references and stripped text of a synopsis
    Tags {
        #[arg(short, long)]
        synopsis: PathBuf,
    },
    /// Animate an existing image (local path, URL or data URI)
    FromImage {
        #[arg(short, long)]
        image: String,
        #[arg(short, long)]
        prompt: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

async fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn profile_context(text: &str, catalog: &ProfileCatalog) -> String {
    let mut out = String::new();
    for kind in [AssetKind::Character, AssetKind::Background] {
        let profiles: Vec<_> = tags::parse_tags(text, kind, catalog)
            .iter()
            .filter_map(|t| catalog.get_by_name(&t.resolved_name, kind))
            .collect();
        out.push_str(&build_profile_context(&profiles, kind));
    }
    out
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling the current run");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;
    init::ensure_directories(&cfg).await?;
    let catalog = ProfileCatalog::load_dir(&cfg.profiles_dir).await?;

    match cli.command {
        Commands::Tags { synopsis } => {
            let text = read_text(&synopsis).await?;
            for kind in [AssetKind::Background, AssetKind::Character] {
                let report = tags::parse_tags_report(&text, kind, &catalog);
                for tag in &report.references {
                    println!("{}: {} (raw: {})", kind, tag.resolved_name, tag.raw_name);
                }
                for warning in &report.warnings {
                    println!("warning: {}", warning);
                }
            }
            let resolver = ai_video_shorts::ReferenceAssetResolver::new(Arc::new(catalog));
            for asset in resolver.build_reference_assets(&text) {
                println!("reference {}: {} -> {}", asset.tag_name(), asset.name, asset.image_path.display());
            }
            println!("stripped: {}", tags::strip_all_tags(&text));
        }
        Commands::Cuts { synopsis } => {
            let text = read_text(&synopsis).await?;
            let client = reqwest::Client::new();
            let context = profile_context(&text, &catalog);
            let cuts = openai::openai_split_cuts(&client, &cfg, &tags::strip_all_tags(&text), &context).await?;
            if cuts.items.is_empty() {
                anyhow::bail!("No cuts returned");
            }
            for cut in &cuts.items {
                println!("Cut {} — {}\n{}\n", cut.index, cut.title, cut.description);
            }
        }
        Commands::Generate {
            synopsis,
            prompt,
            prompt_file,
            out,
        } => {
            let text = read_text(&synopsis).await?;
            let english = match (prompt, prompt_file) {
                (Some(p), _) => p,
                (None, Some(file)) => prompt::resolve_prompt(&read_text(&file).await?),
                (None, None) => {
                    let client = reqwest::Client::new();
                    let context = profile_context(&text, &catalog);
                    let refined =
                        openai::openai_refine_prompt(&client, &cfg, &tags::strip_all_tags(&text), &context)
                            .await?
                            .context("Chat model returned no prompt")?;
                    prompt::resolve_prompt(&refined)
                }
            };

            let save_path = out.unwrap_or_else(|| init::default_output_path(&cfg));
            let transport = Arc::new(RunwayTransport::new(&cfg)?);
            let orchestrator = GenerationOrchestrator::new(cfg, transport, Arc::new(catalog));
            let cancel = cancel_on_ctrl_c();

            let outcome = orchestrator.run(&text, &english, &save_path, &cancel).await?;
            println!("{}", outcome.artifact.display());
        }
        Commands::FromImage { image, prompt, out } => {
            let save_path = out.unwrap_or_else(|| init::default_output_path(&cfg));
            let transport = Arc::new(RunwayTransport::new(&cfg)?);
            let orchestrator = GenerationOrchestrator::new(cfg, transport, Arc::new(catalog));
            let cancel = cancel_on_ctrl_c();

            let english = prompt::resolve_prompt(&prompt);
            let is_remote = image.starts_with("http://") || image.starts_with("https://") || image.starts_with("data:");
            let outcome = if is_remote {
                orchestrator
                    .generate_from_image_url(&image, &english, &save_path, &cancel)
                    .await?
            } else {
                orchestrator
                    .generate_from_local_image(Path::new(&image), &english, &save_path, &cancel)
                    .await?
            };
            println!("{}", outcome.artifact.display());
        }
    }

    Ok(())
}

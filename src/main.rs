use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use breakitdown::config::EngineConfig;
use breakitdown::export::{self, ExportFormat};
use breakitdown::generation::HttpGenerator;
use breakitdown::models::{self, CreateConceptInput, UpdateConceptInput};
use breakitdown::{db, BreakdownCoordinator, BreakdownOutcome, Session, TreeStore};

#[derive(Parser)]
#[command(name = "bitd")]
#[command(about = "Break an idea down into a tree of concepts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new idea
    New {
        name: String,
        /// What you want to build
        prompt: String,
        /// Immediately ask the model for top-level concepts
        #[arg(long)]
        breakdown: bool,
    },
    /// List stored ideas
    List,
    /// Print an idea as a tree
    Show { idea: String },
    /// Add a concept
    Add {
        idea: String,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Parent concept id (or id prefix); omit to add at the root
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Mark a concept as done
    Complete {
        idea: String,
        concept: String,
        /// Mark as not done instead
        #[arg(long)]
        undo: bool,
    },
    /// Remove a concept and everything below it
    Remove { idea: String, concept: String },
    /// Generate sub-concepts for a concept, or top-level concepts for the idea
    Breakdown {
        idea: String,
        concept: Option<String>,
    },
    /// Print an idea in another format
    Export {
        idea: String,
        #[arg(short, long, default_value = "markdown")]
        format: ExportFormat,
    },
    /// Import an idea from an exported JSON file
    Import { path: PathBuf },
    /// Show token usage and cost for an idea
    Usage { idea: String },
    /// Delete an idea
    Delete { idea: String },
}

/// Logs go to stderr so stdout only carries command output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "breakitdown=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Accept a full id, an id prefix or an exact name.
async fn resolve_idea(store: &TreeStore, arg: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(arg) {
        return Ok(id);
    }

    let ideas = store.list_ideas().await?;
    let matches: Vec<_> = ideas
        .iter()
        .filter(|idea| idea.name == arg || idea.id.simple().to_string().starts_with(arg))
        .collect();

    match matches.as_slice() {
        [idea] => Ok(idea.id),
        [] => bail!("No idea matches '{}'", arg),
        _ => bail!("'{}' matches {} ideas; use a longer id", arg, matches.len()),
    }
}

fn resolve_concept(store: &TreeStore, session: &Session, arg: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(arg) {
        return Ok(id);
    }

    let matches: Vec<Uuid> = store
        .get_all_concepts(session)
        .iter()
        .map(|concept| concept.id)
        .filter(|id| id.simple().to_string().starts_with(arg))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("No concept matches '{}'", arg),
        _ => bail!("'{}' matches {} concepts; use a longer id", arg, matches.len()),
    }
}

async fn open(store: &TreeStore, session: &Session, arg: &str) -> anyhow::Result<()> {
    let id = resolve_idea(store, arg).await?;
    store.load_idea(session, id).await?;
    Ok(())
}

fn print_outcome(outcome: &BreakdownOutcome) {
    for concept in &outcome.added {
        println!(
            "+ {} [{}]: {}",
            concept.title,
            export::short_id(concept.id),
            concept.description
        );
    }
    if let Some(usage) = &outcome.usage {
        println!(
            "{} tokens, {}",
            models::format_tokens(usage.total_tokens),
            models::format_cost(usage.cost)
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = EngineConfig::from_env();
    let db = db::Database::open_default()?;
    db.migrate()?;

    let store = TreeStore::new(Arc::new(db));
    let session = Arc::new(Session::new());
    let coordinator = || {
        BreakdownCoordinator::new(
            store.clone(),
            Arc::new(HttpGenerator::from_config(config.generation.clone())),
        )
        .with_settle_grace(config.settle_grace)
    };

    match cli.command {
        Commands::New {
            name,
            prompt,
            breakdown,
        } => {
            let idea = store.create_idea(&session, &name, &prompt).await?;
            println!("Created {} [{}]", idea.name, export::short_id(idea.id));
            if breakdown {
                let outcome = coordinator().break_down_idea(&session, &prompt).await?;
                print_outcome(&outcome);
            }
        }
        Commands::List => {
            for idea in store.list_ideas().await? {
                println!(
                    "{}  {}  ({} concepts, updated {})",
                    export::short_id(idea.id),
                    idea.name,
                    idea.concept_count,
                    idea.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Show { idea } => {
            open(&store, &session, &idea).await?;
            let idea = session.current().context("No idea is loaded")?;
            print!("{}", export::render_tree(&idea));
        }
        Commands::Add {
            idea,
            title,
            description,
            parent,
        } => {
            open(&store, &session, &idea).await?;
            let parent_id = parent
                .map(|parent| resolve_concept(&store, &session, &parent))
                .transpose()?;
            let concept = store
                .add_concept(
                    &session,
                    CreateConceptInput::new(title, description),
                    parent_id,
                )
                .await?;
            println!("Added {} [{}]", concept.title, export::short_id(concept.id));
        }
        Commands::Complete {
            idea,
            concept,
            undo,
        } => {
            open(&store, &session, &idea).await?;
            let id = resolve_concept(&store, &session, &concept)?;
            match store
                .update_concept(&session, id, UpdateConceptInput::completed(!undo))
                .await?
            {
                Some(concept) => println!(
                    "{} {}",
                    if concept.completed { "Completed" } else { "Reopened" },
                    concept.title
                ),
                None => bail!("Concept not found: {}", id),
            }
            if store.is_idea_complete(&session) {
                println!("Every concept is done.");
            }
        }
        Commands::Remove { idea, concept } => {
            open(&store, &session, &idea).await?;
            let id = resolve_concept(&store, &session, &concept)?;
            let removed = store
                .find_concept_by_id(&session, id)
                .map(|concept| concept.descendant_count() + 1)
                .unwrap_or(0);
            if !store.delete_concept(&session, id).await? {
                bail!("Concept not found: {}", id);
            }
            println!("Removed {} concept(s)", removed);
        }
        Commands::Breakdown { idea, concept } => {
            open(&store, &session, &idea).await?;
            let coordinator = coordinator();
            let outcome = match concept {
                Some(concept) => {
                    let id = resolve_concept(&store, &session, &concept)?;
                    coordinator.break_down_concept(&session, id).await?
                }
                None => {
                    let prompt = session
                        .current()
                        .map(|idea| idea.root_idea)
                        .context("No idea is loaded")?;
                    coordinator.break_down_idea(&session, &prompt).await?
                }
            };
            print_outcome(&outcome);
        }
        Commands::Export { idea, format } => {
            open(&store, &session, &idea).await?;
            let idea = session.current().context("No idea is loaded")?;
            print!("{}", export::export(&idea, format)?);
        }
        Commands::Import { path } => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let idea = export::import_json(&json)?;
            store.storage().save(&idea).await?;
            println!("Imported {} [{}]", idea.name, export::short_id(idea.id));
        }
        Commands::Usage { idea } => {
            open(&store, &session, &idea).await?;
            let idea = session.current().context("No idea is loaded")?;
            for (operation, summary) in models::usage_by_operation(&idea.token_usage) {
                println!(
                    "{:<12} {:>4} calls  {:>8} tokens  {}",
                    operation.as_str(),
                    summary.count,
                    models::format_tokens(summary.tokens),
                    models::format_cost(summary.cost)
                );
            }
            println!(
                "{:<12} {:>4} calls  {:>8} tokens  {}",
                "total",
                idea.token_usage.len(),
                models::format_tokens(models::total_tokens(&idea.token_usage)),
                models::format_cost(models::total_cost(&idea.token_usage))
            );
        }
        Commands::Delete { idea } => {
            let id = resolve_idea(&store, &idea).await?;
            if !store.delete_idea(&session, id).await? {
                bail!("Idea not found: {}", id);
            }
            println!("Deleted {}", id);
        }
    }

    store.flush().await?;
    Ok(())
}

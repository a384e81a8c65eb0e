use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use mentor_coaching::{
    CardCache, CoachingCard, CoachingEngine, Destination, JsonFileLedger, MockGenerator,
    TextGenerator,
};
use mentor_context::{BoundedContext, ContextBuilder};
use mentor_core::{Backend, EntitySet, MentorConfig, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "mentor", author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = "mentor.toml", env = "MENTOR_CONFIG")]
    config: PathBuf,

    /// Entity data (goals, habits, journal, pulse) as JSON
    #[arg(short, long, env = "MENTOR_DATA")]
    data: Option<PathBuf>,

    /// Discovery ledger file (defaults to the user data directory)
    #[arg(long, env = "MENTOR_LEDGER")]
    ledger: Option<PathBuf>,

    /// Card cache snapshot, restored before and saved after `card`
    #[arg(long)]
    cache: Option<PathBuf>,

    /// JSON output and JSON logs
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select and print the current coaching card
    Card {
        /// Fill generative cards with the offline mock generator
        #[arg(long)]
        mock_generation: bool,
    },
    /// Print the token-bounded context summary for a backend
    Context {
        #[arg(short, long, default_value = "remote")]
        backend: Backend,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.json);

    let config = MentorConfig::load_or_default(&args.config);
    let entities = load_entities(args.data.as_deref())?;

    match args.command {
        Command::Card { mock_generation } => {
            let ledger_path = args.ledger.clone().unwrap_or_else(default_ledger_path);
            let card = run_card(
                &config,
                &entities,
                &ledger_path,
                args.cache.as_deref(),
                mock_generation,
            )
            .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&card)?);
            } else {
                print_card(&card);
            }
        }
        Command::Context { backend } => {
            let context = ContextBuilder::new(config.context.clone()).build_from(&entities, backend, Utc::now());
            if args.json {
                println!("{}", serde_json::to_string_pretty(&context)?);
            } else {
                println!("{}", context.text);
            }
            report_truncation(&context);
        }
    }

    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed; that's fine.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

fn load_entities(path: Option<&Path>) -> Result<EntitySet> {
    let Some(path) = path else {
        info!("No data file given, starting with an empty entity set");
        return Ok(EntitySet::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;
    let entities = EntitySet::from_json(&content)
        .with_context(|| format!("Failed to parse data file: {}", path.display()))?;
    info!(
        goals = entities.goals.len(),
        habits = entities.habits.len(),
        journal = entities.journal.len(),
        pulse = entities.pulse.len(),
        "Loaded entities from {}",
        path.display()
    );
    Ok(entities)
}

fn default_ledger_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("mentor"))
        .unwrap_or_else(|| PathBuf::from(".mentor"))
        .join("discovered.json")
}

async fn run_card(
    config: &MentorConfig,
    entities: &EntitySet,
    ledger_path: &Path,
    cache_path: Option<&Path>,
    mock_generation: bool,
) -> Result<CoachingCard> {
    let generator: Option<Arc<dyn TextGenerator>> = if mock_generation {
        Some(Arc::new(MockGenerator::echo()))
    } else {
        None
    };
    let ledger = Arc::new(JsonFileLedger::open(ledger_path));

    let mut engine = CoachingEngine::new(
        config.coaching.clone(),
        &config.generation,
        generator,
        ledger,
        Arc::new(SystemClock),
    );
    if let Some(path) = cache_path {
        match std::fs::read_to_string(path) {
            Ok(snapshot) => engine = engine.with_cache(CardCache::restore(&snapshot)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read card cache {}: {}", path.display(), e),
        }
    }

    let card = engine.current_card(entities).await;

    if let Some(path) = cache_path {
        if let Some(snapshot) = engine.cache().export() {
            std::fs::write(path, snapshot)
                .with_context(|| format!("Failed to write card cache: {}", path.display()))?;
        }
    }
    Ok(card)
}

fn print_card(card: &CoachingCard) {
    println!("{}", card.title);
    println!();
    println!("{}", card.body);
    if !card.actions.is_empty() {
        println!();
        for action in &card.actions {
            println!("  [{}] -> {}", action.label, describe(&action.destination));
        }
    }
    println!();
    println!(
        "({}, tier {}, {:?})",
        card.kind.name(),
        card.kind.tier(),
        card.source
    );
}

fn describe(destination: &Destination) -> String {
    match destination {
        Destination::GoalDetail { goal_id } => format!("goal {}", goal_id),
        Destination::HabitDetail { habit_id } => format!("habit {}", habit_id),
        Destination::MilestoneEditor { goal_id } => format!("milestones of goal {}", goal_id),
        Destination::NewGoal => "new goal".to_string(),
        Destination::NewHabit => "new habit".to_string(),
        Destination::NewJournalEntry => "new journal entry".to_string(),
        Destination::Chat => "chat".to_string(),
    }
}

fn report_truncation(context: &BoundedContext) {
    eprintln!(
        "~{} tokens of {} ({} backend)",
        context.estimated_tokens,
        context.budget,
        context.backend.as_str()
    );
    if context.is_truncated() {
        let d = &context.dropped;
        eprintln!(
            "context truncated: dropped {} goals, {} habits, {} journal entries, {} mood check-ins",
            d.goals, d.habits, d.journal, d.pulse
        );
    }
}

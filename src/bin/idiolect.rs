//! idiolect CLI — drive the analysis engine over text files.
//!
//! Usage:
//!   idiolect analyze <file> [--db path] [--config path]
//!   idiolect scores | contexts [--significant] | graph [--topic t]...
//!   idiolect weights [--set signal=value] | reset

use clap::{Parser, Subcommand};
use idiolect::config::default_db_path;
use idiolect::{
    AnalysisEngine, CommandModel, EngineConfig, IdiolectError, IdiolectResult, OpenStore,
    SignalType, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(
    name = "idiolect",
    version,
    about = "Confidence-weighted psychological profiling from text"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a text file, one message per non-empty line
    Analyze {
        /// File to analyze
        file: PathBuf,
        /// Skip the deep (generative model) signal
        #[arg(long)]
        no_deep: bool,
    },
    /// Show aggregate domain scores
    Scores {
        /// Include domains with no data
        #[arg(long)]
        all: bool,
    },
    /// Show cross-context variation per domain
    Contexts {
        /// Only domains whose variation is significant
        #[arg(long)]
        significant: bool,
    },
    /// Derive relationship triples from the current scores
    Graph {
        /// Extra topics to relate to the user
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Show or change fusion weights
    Weights {
        /// Set one weight, e.g. `llm=60`; the others rescale
        #[arg(long)]
        set: Option<String>,
    },
    /// Reset every score to the neutral prior
    Reset,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn resolve_db_path(db: Option<PathBuf>) -> IdiolectResult<PathBuf> {
    db.or_else(default_db_path).ok_or_else(|| {
        IdiolectError::InvalidArgument("no data directory; pass --db".to_string())
    })
}

fn open_engine(
    db: Option<PathBuf>,
    config: Option<&Path>,
    deep: bool,
) -> IdiolectResult<AnalysisEngine> {
    let config = EngineConfig::load_or_default(config)?;
    let db_path = resolve_db_path(db)?;
    let store = SqliteStore::open(&db_path)?;
    info!(db = %db_path.display(), "opened database");

    let model = config.model.clone();
    let mut engine = AnalysisEngine::new(config).with_store(Arc::new(store));

    if deep {
        if let Some(m) = model {
            let command = CommandModel::new(m.program)
                .with_args(m.args)
                .with_timeout(Duration::from_secs(m.timeout_secs));
            engine = engine.with_model(Arc::new(command));
        }
    }

    #[cfg(feature = "embeddings")]
    {
        match idiolect::signal::FastEmbedEmbedder::default_model() {
            Ok(embedder) => engine = engine.with_embedder(Arc::new(embedder)),
            Err(e) => warn!(error = %e, "embedding model unavailable, continuing without it"),
        }
    }

    engine.load()?;
    Ok(engine)
}

fn parse_weight(spec: &str) -> IdiolectResult<(SignalType, u32)> {
    let (name, value) = spec.split_once('=').ok_or_else(|| {
        IdiolectError::InvalidArgument(format!("expected signal=value, got '{}'", spec))
    })?;
    let signal = SignalType::parse(name.trim()).ok_or_else(|| {
        IdiolectError::InvalidArgument(format!(
            "unknown signal '{}' (lexicon, embedding, llm)",
            name
        ))
    })?;
    let value: u32 = value
        .trim()
        .parse()
        .map_err(|_| IdiolectError::InvalidArgument(format!("invalid weight '{}'", value)))?;
    if value > 100 {
        return Err(IdiolectError::InvalidArgument(
            "weights are percentages (0-100)".to_string(),
        ));
    }
    Ok((signal, value))
}

async fn cmd_analyze(engine: Arc<AnalysisEngine>, file: &Path) -> IdiolectResult<()> {
    let text = std::fs::read_to_string(file)?;
    let ticker = engine.start_persistence();
    let deep_ticker = engine.start_deep_signal();

    let mut messages = 0usize;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let report = engine.process_message(line);
        messages += 1;
        if report.deep_due {
            match engine.run_deep_batch().await {
                Ok(Some(deep)) => info!(
                    messages = deep.messages,
                    updated = deep.updates.len(),
                    "deep batch applied"
                ),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "deep signal omitted for this batch"),
            }
        }
    }
    if let Some(deep_ticker) = deep_ticker {
        deep_ticker.shutdown().await;
    }
    if let Err(e) = engine.flush_deep_batch().await {
        warn!(error = %e, "deep signal omitted for the final batch");
    }

    ticker.shutdown().await;
    engine.flush()?;
    println!(
        "Analyzed {} messages; {} domains have data.",
        messages,
        engine.domain_scores().iter().filter(|s| s.has_data()).count()
    );
    Ok(())
}

fn cmd_scores(engine: &AnalysisEngine, all: bool) {
    let scores: Vec<_> = engine
        .domain_scores()
        .into_iter()
        .filter(|s| all || s.has_data())
        .collect();
    if scores.is_empty() {
        println!("No scores yet.");
        return;
    }
    println!(
        "{:<26}  {:<14}  {:>6}  {:>6}  {:>7}",
        "DOMAIN", "CATEGORY", "SCORE", "CONF", "POINTS"
    );
    println!("{}", "-".repeat(67));
    for s in scores {
        println!(
            "{:<26}  {:<14}  {:>6.3}  {:>6.3}  {:>7}",
            s.domain_id.as_str(),
            s.category.as_str(),
            s.score,
            s.confidence,
            s.data_points_count
        );
    }
}

fn cmd_contexts(engine: &AnalysisEngine, significant: bool) {
    let variations = engine.context_variations(significant);
    if variations.is_empty() {
        println!("No domain has data in two or more contexts.");
        return;
    }
    println!(
        "{:<26}  {:>7}  {:>9}  {:<3}  {:<24}  {:<24}",
        "DOMAIN", "OVERALL", "VARIATION", "SIG", "HIGHEST", "LOWEST"
    );
    println!("{}", "-".repeat(102));
    for v in variations {
        println!(
            "{:<26}  {:>7.3}  {:>9.3}  {:<3}  {:<24}  {:<24}",
            v.domain_id.as_str(),
            v.overall_score,
            v.variation_score,
            if v.significant { "yes" } else { "no" },
            v.highest_context.as_str(),
            v.lowest_context.as_str()
        );
    }
}

fn cmd_graph(engine: &AnalysisEngine, topics: &[String]) -> IdiolectResult<()> {
    let triples = engine.build_relationship_graph(topics);
    for t in &triples {
        println!("{}  {}  {}  ({:.2})", t.subject, t.predicate, t.object, t.weight);
    }
    engine.flush()?;
    println!(
        "Added {} triples ({} total).",
        triples.len(),
        engine.relationship_triples().len()
    );
    Ok(())
}

fn cmd_weights(engine: &AnalysisEngine, set: Option<String>) -> IdiolectResult<()> {
    if let Some(spec) = set {
        let (signal, value) = parse_weight(&spec)?;
        engine.set_fusion_weight(signal, value);
        engine.flush()?;
    }
    let w = engine.fusion_weights();
    println!("lexicon={} embedding={} llm={}", w.lexicon, w.embedding, w.llm);
    Ok(())
}

fn run(cli: Cli) -> IdiolectResult<()> {
    let deep = !matches!(cli.command, Commands::Analyze { no_deep: true, .. });
    let engine = open_engine(cli.db, cli.config.as_deref(), deep)?;

    match cli.command {
        Commands::Analyze { file, .. } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cmd_analyze(Arc::new(engine), &file))
        }
        Commands::Scores { all } => {
            cmd_scores(&engine, all);
            Ok(())
        }
        Commands::Contexts { significant } => {
            cmd_contexts(&engine, significant);
            Ok(())
        }
        Commands::Graph { topics } => cmd_graph(&engine, &topics),
        Commands::Weights { set } => cmd_weights(&engine, set),
        Commands::Reset => {
            engine.reset()?;
            println!("All scores reset.");
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

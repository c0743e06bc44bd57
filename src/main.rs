// VoteTally - main.rs
//
// Administration CLI. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation
// 3. Data directory initialisation and consistency checks
// 4. Offline queries, exports and scope settings changes
//
// The live engine is embedded by a chat gateway; this binary only touches
// the durable documents. Edit scope settings only while the gateway is
// stopped: a running engine keeps the settings it loaded and rewrites
// scopes.json from memory on its next settings change.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use votetally::app::state::EngineState;
use votetally::app::store::DocumentStore;
use votetally::core::aggregation::ScopeAggregation;
use votetally::core::export::{self, ExportFormat, ExportKind};
use votetally::core::model::{ChannelId, Emoji, ScopeId, UserId};
use votetally::core::settings::ScopeSettings;
use votetally::platform::config::{self, AppConfig, PlatformPaths};
use votetally::util::error::{ExportError, Result, TallyError};
use votetally::util::{constants, logging};

/// VoteTally - timed reaction voting and leaderboards for chat communities.
#[derive(Parser, Debug)]
#[command(name = "votetally", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Data directory holding registry, aggregation and scope documents.
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create empty documents in the data directory (never overwrites).
    Init,
    /// Load every document and verify its invariants.
    Check,
    /// List submissions still open for voting.
    Pending,
    /// Ranked leaderboard for a scope.
    Leaderboard {
        #[arg(short, long)]
        scope: u64,
    },
    /// Score distribution for a scope, optionally for one author.
    Distribution {
        #[arg(short, long)]
        scope: u64,
        #[arg(short, long)]
        author: Option<u64>,
    },
    /// Cumulative score per author over the scope's submissions.
    Graph {
        #[arg(short, long)]
        scope: u64,
    },
    /// Export an aggregate as CSV or JSON.
    Export {
        #[arg(short, long)]
        scope: u64,
        #[arg(short, long, value_enum, default_value_t = KindArg::Leaderboard)]
        kind: KindArg,
        #[arg(short, long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        /// Restrict a histogram export to one author.
        #[arg(short, long)]
        author: Option<u64>,
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or change per-scope settings (stop the gateway first).
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },
}

#[derive(Subcommand, Debug)]
enum ScopeAction {
    /// Show effective settings (all configured scopes if none given).
    Show {
        #[arg(short, long)]
        scope: Option<u64>,
    },
    /// Bind the channel watched for submissions.
    SetChannel { scope: u64, channel: u64 },
    /// Set the voting window in hours (0 < hours <= 48).
    SetTimer { scope: u64, hours: f64 },
    /// Add a voting option.
    AddEmoji {
        scope: u64,
        emoji: String,
        #[arg(allow_negative_numbers = true)]
        weight: i64,
    },
    /// Remove a voting option.
    RemoveEmoji { scope: u64, emoji: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Leaderboard,
    Series,
    Histogram,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let (config, warnings) = match cli.config.as_deref() {
        Some(path) => config::load_config(path, true),
        None => config::load_config(&platform_paths.config_file(), false),
    }
    .unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    logging::init(
        cli.debug,
        config.log_level.as_deref(),
        config.log_file.as_deref(),
    );
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    tracing::debug!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "VoteTally starting"
    );

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| config.data_dir.clone())
        .unwrap_or_else(|| platform_paths.data_dir.clone());
    let store = DocumentStore::new(data_dir);

    if let Err(e) = run(cli.command, &store, &config) {
        tracing::error!(error = %e, fatal = e.is_fatal(), "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command, store: &DocumentStore, config: &AppConfig) -> Result<()> {
    match command {
        Command::Init => {
            let created = store.initialise()?;
            if created.is_empty() {
                println!("Data directory already initialised: {}", store.data_dir().display());
            }
            for path in created {
                println!("Created {}", path.display());
            }
            Ok(())
        }
        Command::Check => {
            let state = load(store, config)?;
            println!(
                "OK: {} open submission(s), {} scope(s) with results",
                state.registry.len(),
                state.aggregation.scopes().count()
            );
            Ok(())
        }
        Command::Pending => {
            let state = load(store, config)?;
            let mut pending: Vec<_> = state.registry.iter().collect();
            pending.sort_by_key(|(id, e)| (e.expires_at, **id));
            if pending.is_empty() {
                println!("No submissions open for voting.");
            }
            for (id, entry) in pending {
                println!("{id}\tchannel {}\tcloses {}", entry.channel, entry.expires_at);
            }
            Ok(())
        }
        Command::Leaderboard { scope } => {
            let state = load(store, config)?;
            let Some(aggregation) = scope_results(&state, scope) else {
                return Ok(());
            };
            let board = aggregation.leaderboard();
            for row in &board.rows {
                println!(
                    "{:>3}. {:<20} {:>6} pts  {:>4} posted  avg {:.2}",
                    row.rank,
                    row.author.to_string(),
                    row.score,
                    row.submitted,
                    row.average
                );
            }
            if let Some(average) = board.average {
                println!("{} submission(s), scope average {average:.2}", board.submitted);
            }
            Ok(())
        }
        Command::Distribution { scope, author } => {
            let state = load(store, config)?;
            let Some(aggregation) = scope_results(&state, scope) else {
                return Ok(());
            };
            let histogram = aggregation.histogram(author.map(UserId));
            let widest = histogram.values().copied().max().unwrap_or(0);
            for (score, count) in histogram {
                let bar = "#".repeat(((count * 40) / widest.max(1)) as usize);
                println!("{score:>5} | {bar} {count}");
            }
            Ok(())
        }
        Command::Graph { scope } => {
            let state = load(store, config)?;
            let Some(aggregation) = scope_results(&state, scope) else {
                return Ok(());
            };
            for series in aggregation.cumulative() {
                let totals: Vec<String> = series.totals.iter().map(i64::to_string).collect();
                println!("{}\t{}", series.author, totals.join(" "));
            }
            Ok(())
        }
        Command::Export {
            scope,
            kind,
            format,
            author,
            output,
        } => {
            let state = load(store, config)?;
            let aggregation = state
                .aggregation
                .scope(ScopeId(scope))
                .ok_or(ExportError::UnknownScope { scope })?;
            let kind = match kind {
                KindArg::Leaderboard => ExportKind::Leaderboard,
                KindArg::Series => ExportKind::Series,
                KindArg::Histogram => ExportKind::Histogram {
                    author: author.map(UserId),
                },
            };
            let rows = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .map_err(|e| TallyError::from(ExportError::Io { source: e }))?;
                    let rows = export::export(aggregation, kind, format.into(), file)?;
                    tracing::info!(path = %path.display(), rows, "Export written");
                    rows
                }
                None => export::export(aggregation, kind, format.into(), std::io::stdout().lock())?,
            };
            tracing::debug!(rows, "Export complete");
            Ok(())
        }
        Command::Scope { action } => run_scope(action, store, config),
    }
}

fn run_scope(action: ScopeAction, store: &DocumentStore, config: &AppConfig) -> Result<()> {
    let mut settings = store
        .load_settings()?
        .with_default_timer_hours(config.default_timer_hours);

    match action {
        ScopeAction::Show { scope } => {
            let scopes: Vec<ScopeId> = match scope {
                Some(s) => vec![ScopeId(s)],
                None => settings.scopes().into_iter().collect(),
            };
            if scopes.is_empty() {
                println!("No scopes configured; every scope uses the defaults.");
            }
            for scope in scopes {
                show_scope(&settings, scope);
            }
            return Ok(());
        }
        ScopeAction::SetChannel { scope, channel } => {
            settings.bind_channel(ScopeId(scope), ChannelId(channel));
        }
        ScopeAction::SetTimer { scope, hours } => {
            settings.set_timer_hours(ScopeId(scope), hours)?;
        }
        ScopeAction::AddEmoji {
            scope,
            emoji,
            weight,
        } => {
            settings.add_emoji(ScopeId(scope), Emoji::new(emoji), weight)?;
        }
        ScopeAction::RemoveEmoji { scope, emoji } => {
            settings.remove_emoji(ScopeId(scope), &Emoji::new(emoji))?;
        }
    }

    store.save_settings(&settings)?;
    tracing::info!(path = %store.scopes_path().display(), "Scope settings saved");
    Ok(())
}

fn show_scope(settings: &ScopeSettings, scope: ScopeId) {
    let channel = settings
        .channel(scope)
        .map_or_else(|| "unbound".to_string(), |c| c.to_string());
    let options: Vec<String> = settings
        .key(scope)
        .options()
        .into_iter()
        .map(|(emoji, weight)| format!("{emoji}={weight}"))
        .collect();
    println!(
        "scope {scope}: channel {channel}, timer {}h, key {}",
        settings.timer_hours(scope),
        options.join(" ")
    );
}

fn load(store: &DocumentStore, config: &AppConfig) -> Result<EngineState> {
    Ok(EngineState::load(store, config.default_timer_hours)?)
}

fn scope_results(state: &EngineState, scope: u64) -> Option<&ScopeAggregation> {
    let results = state.aggregation.scope(ScopeId(scope));
    if results.is_none() {
        println!("No scored submissions in scope {scope}.");
    }
    results
}

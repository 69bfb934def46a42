//! psylab - controlled human-AI conversation experiments
//!
//! Main entry point for the psylab binary.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use psylab::assignment::{select_active_experiment, AssignmentEngine, SetupRequest};
use psylab::catalog::{Catalog, CatalogStore, FileStore, MemoryStore};
use psylab::chat::ChatService;
use psylab::cli::{ChatArgs, Cli, Commands, ConfigSubcommand, SessionQuery, SessionsSubcommand};
use psylab::clock::{Clock, SystemClock};
use psylab::config::{self, PsylabConfig, StorageBackend};
use psylab::error::{Error, Result};
use psylab::inference::{InferenceBackend, OpenAiBackend};
use psylab::logging;
use psylab::report::{self, Labels, SessionFilter, SessionSummary};
use psylab::session::{PersistenceGateway, SessionManager};
use psylab::types::DemographicData;
use psylab::version::BuildInfo;

/// Chat input prefix that attaches an image URL to the next message.
const ATTACH_COMMAND: &str = "/attach ";
const END_COMMAND: &str = "/end";

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // Commands that don't need the runtime or full logging
    match &cli.command {
        Commands::Version { json } => {
            return print_version(*json);
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = match PsylabConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = BuildInfo::current();
    debug!(
        version = %build.short_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting psylab"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    let result = runtime.block_on(async move {
        match cli.command {
            Commands::Chat(args) => run_chat(config, args).await,
            Commands::Catalog => list_catalog(config).await,
            Commands::Sessions { subcommand } => handle_sessions_command(config, subcommand).await,
            Commands::Version { .. } | Commands::Config { .. } => {
                // Already handled above
                unreachable!();
            }
        }
    });

    if let Err(e) = result {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }

    Ok(())
}

fn open_catalog(config: &PsylabConfig) -> Catalog {
    let store: Arc<dyn CatalogStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(FileStore::new(config.data_dir())),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(store = store.name(), "Catalog store opened");
    Catalog::new(store)
}

// ─────────────────────────────────────────────────────────────────
// chat
// ─────────────────────────────────────────────────────────────────

async fn run_chat(config: PsylabConfig, args: ChatArgs) -> Result<()> {
    let catalog = open_catalog(&config);
    let snapshot = catalog.load_snapshot().await?;

    let preferred = args
        .experiment
        .as_deref()
        .or(config.experiment.active_experiment.as_deref());
    let experiment = select_active_experiment(&snapshot.experiments, preferred)?.clone();
    let engine = AssignmentEngine::new(args.seed.or(config.experiment.seed));

    let mut inference = config.inference.to_openai_config();
    if let Some(model) = args.model.clone() {
        inference.default_model = model;
    }
    let model = inference.default_model.clone();
    let backend = OpenAiBackend::new(inference)?;

    match backend.health_check().await {
        Ok(health) if health.operational => debug!(backend = backend.name(), "Inference service reachable"),
        Ok(health) => warn!(
            backend = backend.name(),
            error = health.error.as_deref().unwrap_or("unknown"),
            "Inference service is not healthy; replies may fail"
        ),
        Err(e) => warn!(backend = backend.name(), error = %e, "Inference health check failed"),
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = PersistenceGateway::new(catalog.store(), clock.clone(), config.session.throttle_policy());
    let manager = SessionManager::new(gateway, clock.clone(), config.session.user_agent());
    let mut chat = ChatService::new(manager, Arc::new(backend), snapshot, engine, model);

    let request = SetupRequest {
        consent_given: args.consent,
        demographics: DemographicData {
            age: args.age,
            gender: args.gender.clone(),
            profession: args.profession.clone(),
            experience_level: args.experience,
        },
        persona_id: args.persona.clone(),
        condition_id: args.condition.clone(),
        chat_id: None,
    };
    let outcome = chat.start(&catalog, &experiment, request).await?;

    println!("{}", experiment.name);
    println!("Session {} started. Type {} to finish.", outcome.session.id, END_COMMAND);
    println!();

    let outcome = chat_loop(&mut chat).await;

    if let Some(ended) = chat.finish(outcome).await? {
        println!();
        println!(
            "Session {} {}: {} messages in {}s",
            ended.id,
            ended.status,
            ended.metadata.message_count,
            ended.metadata.session_duration_ms.unwrap_or(0) / 1000
        );
    }

    Ok(())
}

async fn chat_loop(chat: &mut ChatService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_attachments: Vec<String> = Vec::new();
    let mut overrun_noted = false;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        // Ctrl+C at the prompt ends the session like /end
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == END_COMMAND {
            break;
        }
        if let Some(url) = input.strip_prefix(ATTACH_COMMAND) {
            pending_attachments.push(url.trim().to_string());
            println!("(attachment queued for the next message)");
            continue;
        }

        if chat
            .current_settings()
            .is_some_and(|s| s.show_typing_indicator)
        {
            println!("(typing...)");
        }

        let cancel = CancellationToken::new();
        let attachments = std::mem::take(&mut pending_attachments);
        let result = {
            let turn = stream_turn(chat, input, attachments, cancel.clone());
            tokio::pin!(turn);

            tokio::select! {
                result = &mut turn => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    turn.await
                }
            }
        };

        match result {
            Ok(()) => println!(),
            Err(e) if e.is_turn_scoped() => {
                println!();
                eprint!("{}", e.format_for_terminal());
            }
            Err(e) => return Err(e),
        }

        if !overrun_noted && chat.manager().advisory_overrun(Utc::now()) {
            overrun_noted = true;
            println!("(note: this session has passed its planned duration)");
        }
    }

    Ok(())
}

/// Submit one message and print the reply as it streams in.
async fn stream_turn(
    chat: &mut ChatService,
    text: &str,
    attachments: Vec<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut turn = chat.submit_turn(text, attachments, cancel).await?;
    let mut stdout = std::io::stdout();

    while let Some(chunk) = turn.next().await? {
        print!("{}", chunk);
        stdout.flush()?;
    }

    chat.complete_turn(turn).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// catalog / sessions
// ─────────────────────────────────────────────────────────────────

async fn list_catalog(config: PsylabConfig) -> Result<()> {
    let catalog = open_catalog(&config);
    let snapshot = catalog.load_snapshot().await?;

    println!("Personas:");
    for persona in &snapshot.personas {
        println!("  {:<28} {:<13} {}", persona.id, persona.category.as_str(), persona.name);
    }

    println!("\nConditions:");
    for condition in &snapshot.conditions {
        let s = &condition.settings;
        println!(
            "  {:<28} delay={}ms{} length={} context={}",
            condition.id,
            s.response_delay_ms,
            if s.random_response_delay { " (random)" } else { "" },
            s.max_response_length,
            s.context_awareness
        );
    }

    println!("\nExperiments:");
    for experiment in &snapshot.experiments {
        println!(
            "  {:<28} {:<8} {:<10} personas=[{}] conditions=[{}]",
            experiment.id,
            if experiment.is_active { "active" } else { "inactive" },
            if experiment.randomize_assignment { "random" } else { "manual" },
            experiment.personas.join(", "),
            experiment.conditions.join(", ")
        );
    }

    Ok(())
}

fn filter_from(query: &SessionQuery) -> SessionFilter {
    SessionFilter {
        status: query.status,
        search: query.search.clone(),
    }
}

async fn handle_sessions_command(config: PsylabConfig, subcommand: SessionsSubcommand) -> Result<()> {
    let catalog = open_catalog(&config);
    let sessions = catalog.list_sessions().await?;
    let now = Utc::now();

    match subcommand {
        SessionsSubcommand::List(query) => {
            let selected = filter_from(&query).apply(&sessions);
            let summary = SessionSummary::of(&selected);

            for session in &selected {
                println!(
                    "{:<40} {:<42} {:<10} {:>4} msgs {:>5}m",
                    session.id,
                    session.participant_id,
                    session.status.as_str(),
                    session.metadata.message_count,
                    report::duration_minutes(session, now)
                );
            }
            println!(
                "\n{} sessions, {} messages, {} completed, {} active",
                summary.sessions, summary.messages, summary.completed, summary.active
            );
        }
        SessionsSubcommand::Export { query, output } => {
            let snapshot = catalog.load_snapshot().await?;
            let selected = filter_from(&query).apply(&sessions);
            let labels = Labels {
                personas: &snapshot.personas,
                conditions: &snapshot.conditions,
                experiments: &snapshot.experiments,
            };
            let csv = report::export_csv(&selected, &labels, now);

            match output {
                Some(path) => {
                    let path = PathBuf::from(path);
                    std::fs::write(&path, format!("{}\n", csv)).map_err(|source| Error::IoWrite {
                        path: path.clone(),
                        source,
                    })?;
                    info!(path = %path.display(), sessions = selected.len(), "Sessions exported");
                }
                None => println!("{}", csv),
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// config / version
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = PsylabConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate => match PsylabConfig::load(config_path) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}

fn print_version(json: bool) -> Result<()> {
    let info = BuildInfo::current();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info);
    }
    Ok(())
}

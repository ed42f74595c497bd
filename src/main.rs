//! CampaignOS command-line shell.
//!
//! Thin wrapper over the command surface: one subcommand per operation,
//! JSON output for structured results. `--offline` swaps the remote
//! document store for the in-process backend (ephemeral, useful for demos
//! and smoke tests).

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use campaignos_lib::assistant::{AssistantGateway, DisabledAssistant, HttpAssistant};
use campaignos_lib::commands;
use campaignos_lib::docstore::{DocumentStore, MemoryStore, RemoteStore};
use campaignos_lib::goals::GoalUpdate;
use campaignos_lib::approval::ApprovalAction;
use campaignos_lib::revenue;
use campaignos_lib::state::{self, AppState};
use campaignos_lib::types::{CampaignType, EventUpdates};

/// How long to wait for background writes before a one-shot command exits.
const WRITE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "campaignos", version, about = "Campaign planning calendar")]
struct Cli {
    /// Use the in-process document store instead of the remote one.
    #[arg(long)]
    offline: bool,

    /// Client to operate on (defaults to activeClient from config).
    #[arg(long, env = "CAMPAIGNOS_CLIENT")]
    client: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the initial config file.
    Init {
        #[arg(long)]
        store_url: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        client: Option<String>,
    },
    /// List the active client's campaign events.
    List,
    /// Create a campaign event.
    Create {
        /// Calendar day, YYYY-MM-DD.
        date: String,
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Campaign type; detected from title/content when omitted.
        #[arg(long = "type")]
        campaign_type: Option<String>,
    },
    /// Update fields on an event.
    Update {
        event_id: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "type")]
        campaign_type: Option<String>,
    },
    /// Delete one event.
    Delete { event_id: String },
    /// Delete every event in a month.
    WipeMonth { year: i32, month: u32 },
    /// Approval transition: request | approve | reject.
    Approval { event_id: String, action: String },
    /// Show the goal for a month.
    Goal { year: i32, month: u32 },
    /// Create or override the goal for a month.
    SetGoal {
        year: i32,
        month: u32,
        target: f64,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Goal progress and pacing recommendations for a month.
    Progress { year: i32, month: u32 },
    /// Month summary: counts, estimate, goal progress.
    Overview { year: i32, month: u32 },
    /// Import events embedded in the legacy client document.
    ImportLegacy,
    /// Chat with the assistant (interactive when no utterance is given).
    Chat { utterance: Option<String> },
    /// Sync session status.
    Status,
    /// List campaign types with multipliers and display colors.
    Types,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Command::Init {
        store_url,
        api_key,
        client,
    } = &cli.command
    {
        let mut config = state::load_config().unwrap_or_default();
        config.store.base_url = store_url.clone();
        config.store.api_key = api_key.clone();
        if client.is_some() {
            config.active_client = client.clone();
        }
        let path = state::config_path()?;
        state::save_config_to(&path, &config)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    if matches!(cli.command, Command::Types) {
        let rows: Vec<serde_json::Value> = CampaignType::ALL
            .iter()
            .map(|ty| {
                serde_json::json!({
                    "type": ty.as_str(),
                    "displayName": ty.display_name(),
                    "multiplier": revenue::multiplier(*ty),
                    "displayColor": ty.display_color(),
                })
            })
            .collect();
        return print_json(&rows);
    }

    let config = state::load_config().ok();

    let gateway: Arc<dyn DocumentStore> = if cli.offline {
        log::info!("offline mode: using in-process document store");
        Arc::new(MemoryStore::new())
    } else {
        let store_config = config
            .as_ref()
            .map(|c| c.store.clone())
            .ok_or("No config found. Run `campaignos init` or pass --offline.")?;
        Arc::new(RemoteStore::new(&store_config).map_err(|e| e.to_string())?)
    };

    let assistant: Arc<dyn AssistantGateway> = match config.as_ref().map(|c| &c.assistant) {
        Some(assistant_config) if assistant_config.enabled => {
            Arc::new(HttpAssistant::new(assistant_config).map_err(|e| e.to_string())?)
        }
        _ => Arc::new(DisabledAssistant),
    };

    let state = AppState::with_config(gateway, assistant, config);

    let client_id = cli
        .client
        .clone()
        .or_else(|| state.config_snapshot().active_client)
        .ok_or("No client selected. Pass --client or set activeClient in config.")?;
    let client_name = commands::select_client(&state, &client_id).await?;
    log::info!("active client: {client_name}");

    match cli.command {
        Command::Init { .. } | Command::Types => unreachable!("handled above"),
        Command::List => {
            let events = commands::list_events(&state)?;
            print_json(&events)?;
        }
        Command::Create {
            date,
            title,
            content,
            campaign_type,
        } => {
            let event = commands::create_event(
                &state,
                commands::CreateEventRequest {
                    date,
                    title,
                    content,
                    campaign_type,
                },
            )?;
            print_json(&event)?;
        }
        Command::Update {
            event_id,
            date,
            title,
            content,
            campaign_type,
        } => {
            let date = match date {
                Some(raw) => Some(
                    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                        .map_err(|_| format!("unparseable date {raw:?}"))?,
                ),
                None => None,
            };
            let campaign_type = match campaign_type {
                Some(raw) => Some(
                    CampaignType::parse(&raw)
                        .ok_or_else(|| format!("unknown campaign type {raw:?}"))?,
                ),
                None => None,
            };
            let updates = EventUpdates {
                date,
                title,
                content,
                campaign_type,
            };
            let event = commands::update_event(&state, &event_id, &updates)?;
            print_json(&event)?;
        }
        Command::Delete { event_id } => {
            commands::delete_event(&state, &event_id)?;
            println!("deleted {event_id}");
        }
        Command::WipeMonth { year, month } => {
            let ids = commands::bulk_delete_month(&state, year, month).await?;
            println!("deleted {} event(s) from {year}-{month:02}", ids.len());
        }
        Command::Approval { event_id, action } => {
            let action = parse_approval_action(&action)?;
            let event = commands::transition_approval(&state, &event_id, action)?;
            print_json(&event)?;
        }
        Command::Goal { year, month } => match commands::get_goal(&state, year, month).await? {
            Some(goal) => print_json(&goal)?,
            None => println!("no goal set for {year}-{month:02}"),
        },
        Command::SetGoal {
            year,
            month,
            target,
            notes,
            by,
        } => {
            let goal = commands::set_goal(
                &state,
                year,
                month,
                GoalUpdate {
                    revenue_goal: target,
                    calculation_method: Default::default(),
                    confidence: None,
                    notes,
                    changed_by: by,
                },
            )
            .await?;
            print_json(&goal)?;
        }
        Command::Progress { year, month } => {
            let view = commands::goal_progress(&state, year, month).await?;
            print_json(&view)?;
        }
        Command::Overview { year, month } => {
            let overview = commands::month_overview(&state, year, month).await?;
            print_json(&overview)?;
        }
        Command::ImportLegacy => {
            let imported = commands::import_legacy_events(&state).await?;
            println!("imported {imported} legacy event(s)");
        }
        Command::Chat { utterance } => match utterance {
            Some(utterance) => {
                let outcome = commands::send_chat(&state, &utterance).await?;
                println!("{}", outcome.reply);
            }
            None => chat_loop(&state).await?,
        },
        Command::Status => {
            print_json(&commands::sync_status(&state)?)?;
        }
    }

    // One-shot process: let background writes settle, surface any failure.
    if !state.controller.flush(WRITE_FLUSH_TIMEOUT).await {
        eprintln!("warning: some writes were still in flight at exit");
    }
    if let Some(write_error) = state.controller.take_write_error() {
        return Err(write_error);
    }
    state.controller.teardown();
    Ok(())
}

/// Interactive chat: one exchange per line, until EOF or `exit`.
async fn chat_loop(state: &AppState) -> Result<(), String> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("you> ");
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(format!("stdin: {e}")),
        }
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if utterance == "exit" || utterance == "quit" {
            return Ok(());
        }

        match commands::send_chat(state, utterance).await {
            Ok(outcome) => println!("assistant> {}", outcome.reply),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

fn parse_approval_action(raw: &str) -> Result<ApprovalAction, String> {
    match raw.trim().to_lowercase().as_str() {
        "request" => Ok(ApprovalAction::Request),
        "approve" => Ok(ApprovalAction::Approve),
        "reject" => Ok(ApprovalAction::Reject),
        other => Err(format!(
            "unknown approval action {other:?} (expected request|approve|reject)"
        )),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| format!("serialize: {e}"))?;
    println!("{rendered}");
    Ok(())
}

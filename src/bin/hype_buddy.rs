//! CLI binary for hype-buddy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hype_buddy::entitlement::StaticEntitlements;
use hype_buddy::generation::GeminiClient;
use hype_buddy::orchestrator::{ChatHandle, ChatState, Modality};
use hype_buddy::reminder::{FiredReminder, TokioReminders};
use hype_buddy::store::{SessionFilter, SqliteHypeStore};
use hype_buddy::{
    HypeConfig, HypeRequest, HypeService, Outcome, Persona, Scenario, ServiceDeps, VoiceDelivery,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Hype Buddy: personalized spoken motivation for the moments that matter.
#[derive(Parser)]
#[command(name = "hype-buddy", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat this run as premium (no weekly quota, larger memory).
    #[arg(long)]
    premium: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Get a quick hype for a moment.
    Hype {
        /// presentation, interview, workout, date, hard_conversation
        #[arg(short, long)]
        scenario: Option<Scenario>,

        /// Describe the moment in your own words.
        #[arg(short, long)]
        input: Option<String>,

        /// Persona for this hype (must be unlocked).
        #[arg(short, long)]
        persona: Option<Persona>,

        /// Print only; don't speak.
        #[arg(long)]
        no_voice: bool,
    },

    /// Talk it through, one line at a time. `/quit` to leave.
    Chat {
        /// Persona to chat with; also becomes your default.
        #[arg(short, long)]
        persona: Option<Persona>,

        #[arg(long)]
        no_voice: bool,
    },

    /// Record how it went.
    Log {
        session: Uuid,
        outcome: Outcome,
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List past hypes, newest first.
    History {
        #[arg(short, long, value_enum, default_value_t = HistoryFilter::All)]
        filter: HistoryFilter,
    },

    /// Show usage, wins, and unlock progress.
    Stats,

    /// List personas and which are unlocked.
    Personas,

    /// Delete a past hype.
    Delete { session: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryFilter {
    All,
    Wins,
    Pending,
    Logged,
}

impl From<HistoryFilter> for SessionFilter {
    fn from(filter: HistoryFilter) -> Self {
        match filter {
            HistoryFilter::All => Self::All,
            HistoryFilter::Wins => Self::Wins,
            HistoryFilter::Pending => Self::Pending,
            HistoryFilter::Logged => Self::Logged,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so hype text on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hype_buddy=info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(HypeConfig::default_config_path);
    let config = HypeConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let wants_voice = match &cli.command {
        Command::Hype { no_voice, .. } | Command::Chat { no_voice, .. } => !no_voice,
        _ => false,
    };
    let (service, reminders_rx) = build_service(config, cli.premium, wants_voice)?;

    match cli.command {
        Command::Hype {
            scenario,
            input,
            persona,
            ..
        } => {
            run_hype(
                &service,
                HypeRequest {
                    scenario,
                    free_text: input,
                    persona,
                },
            )
            .await
        }
        Command::Chat { persona, .. } => run_chat(&service, persona, wants_voice, reminders_rx).await,
        Command::Log {
            session,
            outcome,
            notes,
        } => {
            service.log_outcome(session, outcome, notes.as_deref())?;
            println!("Logged {outcome} for {session}.");
            Ok(())
        }
        Command::History { filter } => print_history(&service, filter.into()),
        Command::Stats => print_stats(&service),
        Command::Personas => print_personas(&service),
        Command::Delete { session } => {
            service.delete_session(session)?;
            println!("Deleted {session}.");
            Ok(())
        }
    }
}

fn build_service(
    config: HypeConfig,
    premium: bool,
    wants_voice: bool,
) -> anyhow::Result<(HypeService, mpsc::UnboundedReceiver<FiredReminder>)>
{
    let store = SqliteHypeStore::open(&config.store.db_path)
        .with_context(|| format!("opening {}", config.store.db_path.display()))?;
    let generator = GeminiClient::new(&config.generation);
    if !generator.is_available() {
        warn!("no generation API key; set GEMINI_API_KEY or generation.api_key");
    }

    let voice = if wants_voice {
        match VoiceDelivery::from_config(&config.tts) {
            Ok(voice) => Some(Arc::new(voice)),
            Err(e) => {
                warn!(error = %e, "voice output unavailable; printing only");
                None
            }
        }
    } else {
        None
    };

    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let deps = ServiceDeps {
        store: Arc::new(store),
        generator: Arc::new(generator),
        reminders: Arc::new(TokioReminders::new(fired_tx)),
        entitlements: Arc::new(StaticEntitlements::new(premium)),
        voice,
        recognizer: None,
    };
    Ok((HypeService::new(config, deps)?, fired_rx))
}

async fn run_hype(service: &HypeService, request: HypeRequest) -> anyhow::Result<()> {
    let hype = service.generate_hype(request).await?;
    println!("{}\n", hype.session.response);
    println!("Session {}", hype.session.id);
    for persona in &hype.newly_unlocked {
        println!("Unlocked {}!", persona.display_name());
    }

    if let Some(voice) = service.voice() {
        voice.set_persona(hype.session.persona);
        let playback = voice.speak(&hype.session.response);
        tokio::select! {
            outcome = playback.finished() => info!(?outcome, "hype spoken"),
            _ = tokio::signal::ctrl_c() => voice.stop(),
        }
    }
    Ok(())
}

async fn run_chat(
    service: &HypeService,
    persona: Option<Persona>,
    voice_output: bool,
    mut reminders: mpsc::UnboundedReceiver<FiredReminder>,
) -> anyhow::Result<()> {
    if let Some(persona) = persona {
        service.select_persona(persona)?;
    }
    let persona = service.profile()?.selected_persona;
    let chat = service.start_chat(Modality::Text, voice_output)?;
    println!(
        "Chatting with {}. Type a message, or /quit to leave.\n",
        persona.display_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                chat_turn(&chat, line, persona).await?;
            }
            Some(fired) = reminders.recv() => println!("\n[reminder] {}\n", fired.body),
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    chat.shutdown().await;
    Ok(())
}

async fn chat_turn(chat: &ChatHandle, line: &str, persona: Persona) -> anyhow::Result<()> {
    let revision = chat.snapshot().revision;
    chat.submit_text(line)?;
    let snapshot = chat.wait_settled(revision).await?;
    match &snapshot.state {
        ChatState::Error(message) => {
            println!("! {message}\n");
            chat.dismiss()?;
        }
        _ => {
            if let Some(reply) = snapshot.transcript.last().filter(|t| !t.is_user()) {
                println!("{}: {}\n", persona.display_name(), reply.text);
            }
        }
    }
    Ok(())
}

fn print_history(service: &HypeService, filter: SessionFilter) -> anyhow::Result<()> {
    let sessions = service.history(filter)?;
    if sessions.is_empty() {
        println!("No hypes yet.");
    }
    for session in sessions {
        let outcome = session.outcome.map_or("pending", Outcome::as_str);
        println!(
            "{}  {}  {:<18} {:<8} {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.scenario,
            outcome,
            session.user_input
        );
    }
    Ok(())
}

fn print_stats(service: &HypeService) -> anyhow::Result<()> {
    let stats = service.stats()?;
    println!("Hypes:        {}", stats.total_hypes);
    println!("Wins:         {}", stats.total_wins);
    println!("Win rate:     {:.0}%", stats.win_rate * 100.0);
    if stats.is_premium {
        println!("Plan:         premium");
    } else {
        println!("Free left:    {} this week", stats.free_uses_remaining);
    }
    if let Some(next) = stats.next_unlock {
        println!(
            "Next unlock:  {} ({}/{})",
            next.persona.display_name(),
            next.current,
            next.required
        );
    }
    Ok(())
}

fn print_personas(service: &HypeService) -> anyhow::Result<()> {
    let profile = service.profile()?;
    for persona in Persona::ALL {
        let marker = if persona == profile.selected_persona {
            "*"
        } else {
            " "
        };
        let status = if profile.is_unlocked(persona) {
            "unlocked".to_owned()
        } else {
            format!("unlocks at {} hypes", persona.unlock_threshold())
        };
        println!("{marker} {:<8} {:<10} {status}", persona.id(), persona.display_name());
    }
    Ok(())
}

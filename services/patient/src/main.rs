mod audio_input;
mod avatar_adapter;
mod backend_adapter;
mod config;
mod console_speaker;
mod persona_loader;

use crate::audio_input::AudioInput;
use crate::avatar_adapter::AvatarSpeaker;
use crate::backend_adapter::BackendAdapter;
use crate::config::{Config, SpeechMode};
use crate::console_speaker::ConsoleSpeaker;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use virtual_patient_core::error::TurnError;
use virtual_patient_core::persona::{Catalog, Persona};
use virtual_patient_core::session::{EndReason, PatientSession, TurnReply};
use virtual_patient_core::speaker::Speaker;
use virtual_patient_core::APOLOGY_MESSAGE;

#[derive(Parser)]
#[command(version, about = "Talk to a scripted virtual patient")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the patients available for a consultation
    Patients,
    /// Start a consultation and talk to the patient from the terminal
    Chat {
        #[arg(short, long, default_value = "cameron-finlayson")]
        patient: String,
    },
    /// Send one recorded question and hear the patient's answer
    Transcribe {
        file: PathBuf,
        #[arg(short, long, default_value = "cameron-finlayson")]
        patient: String,
    },
}

/// What the chat loop waits on between turns.
enum Input {
    Line(Option<String>),
    Quit,
    Expired,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting virtual patient service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Load Patients ---
    let catalog = persona_loader::load_catalog(config.personas_dir.as_deref())
        .context("Failed to load patient personas")?;
    tracing::info!("Loaded {} patients successfully.", catalog.len());

    match args.command {
        Command::Patients => {
            list_patients(&catalog);
            Ok(())
        }
        Command::Chat { patient } => {
            let persona = find_patient(&catalog, &patient)?;
            let mut session = open_session(&config, persona).await?;
            let reason = match chat_loop(&mut session).await {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!("Chat loop failed: {:?}", e);
                    EndReason::Disconnected
                }
            };
            session.end(reason).await;
            Ok(())
        }
        Command::Transcribe { file, patient } => {
            let persona = find_patient(&catalog, &patient)?;
            let mut session = open_session(&config, persona).await?;
            let mut audio_input = AudioInput::new();
            let result = send_recording(&mut session, &mut audio_input, &file, false).await;
            session.end(EndReason::Requested).await;
            result
        }
    }
}

fn find_patient(catalog: &Catalog, id: &str) -> Result<Persona> {
    catalog.find(id).cloned().with_context(|| {
        let known: Vec<&str> = catalog.iter().map(|p| p.id.as_str()).collect();
        format!("Unknown patient '{}'. Available: {}", id, known.join(", "))
    })
}

fn list_patients(catalog: &Catalog) {
    for persona in catalog.iter() {
        println!(
            "{:<20} {}, {}: {}",
            persona.id, persona.name, persona.age, persona.short_description
        );
    }
}

async fn build_speaker(config: &Config, persona: &Persona) -> Result<Option<Arc<dyn Speaker>>> {
    let speaker: Option<Arc<dyn Speaker>> = match config.speech_mode {
        SpeechMode::Console => Some(Arc::new(ConsoleSpeaker::stdout(persona.first_name()))),
        SpeechMode::Avatar => {
            let api_key = config
                .avatar_api_key
                .clone()
                .context("AVATAR_API_KEY must be set for avatar speech mode")?;
            let avatar_id = config.avatar_id.as_deref().unwrap_or(persona.avatar_id.as_str());
            let avatar = AvatarSpeaker::start(&config.avatar_api_url, api_key, avatar_id)
                .await
                .context("Failed to start the avatar session")?;
            Some(Arc::new(avatar))
        }
        SpeechMode::None => None,
    };
    Ok(speaker)
}

async fn open_session(config: &Config, persona: Persona) -> Result<PatientSession> {
    let backend = Arc::new(BackendAdapter::connect(&config.backend_url)?);
    let speaker = build_speaker(config, &persona).await?;
    let mut session = PatientSession::new(persona, backend, speaker, config.session_settings());
    session.start().await;
    Ok(session)
}

async fn chat_loop(session: &mut PatientSession) -> Result<EndReason> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut audio_input = AudioInput::new();
    println!(
        "Consultation with {}. Type /time, /audio <file>, /retry-audio <file>, /transcript or /quit. Ctrl-C interrupts the patient.",
        session.persona().name
    );

    loop {
        match audio_input.indicator() {
            Some(indicator) => print!("[{}] ({}) You: ", session.format_remaining(), indicator),
            None => print!("[{}] You: ", session.format_remaining()),
        }
        std::io::stdout().flush()?;

        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            _ = tokio::signal::ctrl_c() => Input::Quit,
            _ = session.expired() => Input::Expired,
        };

        let line = match input {
            Input::Line(Some(line)) => line,
            Input::Line(None) | Input::Quit => return Ok(EndReason::Requested),
            Input::Expired => {
                println!("\nSession time is up.");
                return Ok(EndReason::Expired);
            }
        };

        let line = line.trim();
        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => return Ok(EndReason::Requested),
            ("/time", _) => {
                println!(
                    "{} remaining ({:.0}%)",
                    session.format_remaining(),
                    session.progress_percent()
                );
                continue;
            }
            ("/transcript", _) => {
                print_transcript(session);
                continue;
            }
            (command @ ("/audio" | "/retry-audio"), path) => {
                let retry = command == "/retry-audio";
                let path = Path::new(path.trim());
                if let Err(e) = send_recording(session, &mut audio_input, path, retry).await {
                    println!("Could not use that recording: {e:#}");
                }
                continue;
            }
            _ => run_turn(session, line).await,
        };

        match result {
            Ok(reply) => show_reply(session, &reply),
            Err(TurnError::Cancelled) => println!("(interrupted)"),
            Err(TurnError::Expired) => {
                println!("Session time is up.");
                return Ok(EndReason::Expired);
            }
            Err(TurnError::Inactive) => return Ok(EndReason::Disconnected),
            Err(e) if !session.has_speech() => {
                tracing::debug!("turn failed in chat mode: {}", e);
                println!("{}: {}", session.persona().first_name(), APOLOGY_MESSAGE);
            }
            Err(_) => {}
        }
    }
}

/// Runs one turn while letting Ctrl-C cut it short.
async fn run_turn(session: &mut PatientSession, line: &str) -> Result<TurnReply, TurnError> {
    let interrupter = session.interrupter();
    let turn = session.send_user_message(line);
    tokio::pin!(turn);
    loop {
        tokio::select! {
            result = &mut turn => return result,
            _ = tokio::signal::ctrl_c() => interrupter.interrupt(),
        }
    }
}

async fn send_recording(
    session: &mut PatientSession,
    audio_input: &mut AudioInput,
    path: &Path,
    retry: bool,
) -> Result<()> {
    let audio = audio_input.read(path, retry).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("recording.wav")
        .to_string();

    let reply = session.transcribe(audio, &file_name).await?;
    let transcript: Vec<_> = session.conversation().transcript().collect();
    if let Some(question) = transcript.len().checked_sub(2).map(|i| transcript[i]) {
        println!("You: {}", question.content());
    }
    show_reply(session, &reply);
    Ok(())
}

fn show_reply(session: &PatientSession, reply: &TurnReply) {
    // With speech active the chunks have already been voiced.
    if !session.has_speech() && !reply.text.is_empty() {
        println!("{}: {}", session.persona().first_name(), reply.text);
    }
}

fn print_transcript(session: &PatientSession) {
    let first_name = session.persona().first_name();
    for message in session.conversation().transcript() {
        let who = match message.role() {
            virtual_patient::types::MessageRole::User => "You",
            _ => first_name,
        };
        println!("{}: {}", who, message.content());
    }
}

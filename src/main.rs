use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Args, Parser, Subcommand};
use mood_twin::analysis::{Analyzer, HttpAnalyzer, ScriptedAnalyzer};
use mood_twin::capture::{
    CommandCaptureSource, FixedGalleryPicker, GalleryPicker, PermissionPrompt, PermissionStatus,
};
use mood_twin::companion::{Companion, HttpCompanion, ScriptedCompanion};
use mood_twin::config::{AppConfig, BackendMode, ensure_sample_config};
use mood_twin::conversation::{
    ConversationController, ConversationSession, GREETING, Message, ReplyUpdate, Sender,
};
use mood_twin::error::FailureKind;
use mood_twin::journal::MarkdownJournal;
use mood_twin::paths::default_config_path;
use mood_twin::scan::{ScanController, ScanError, ScanNotice, ScanUpdate};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mood-twin")]
#[command(about = "Stress scans and companion chat against the Mood Twin service")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the scripted analyzer and companion instead of the remote service.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture or pick a photo, analyze it, and optionally journal the result.
    Scan(ScanArgs),
    /// Talk to the companion.
    Chat(ChatArgs),
    /// Write a sample configuration file if none exists.
    InitConfig,
}

#[derive(Debug, Args, Clone)]
struct ScanArgs {
    /// Pick from the gallery instead of the camera. With a path, that file is used.
    #[arg(long, num_args = 0..=1)]
    gallery: Option<Option<PathBuf>>,
}

#[derive(Debug, Args, Clone)]
struct ChatArgs {
    /// Latest stress level (0-100) to give the companion as context.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    stress_level: Option<u8>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mood_twin=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::InitConfig => {
            if ensure_sample_config(&config_path)? {
                println!("wrote sample config to {}", config_path.display());
            } else {
                println!("config already exists at {}", config_path.display());
            }
            Ok(())
        }
        Commands::Scan(args) => {
            let config = AppConfig::load(&config_path)?;
            run_scan(&config, cli.offline, args).await
        }
        Commands::Chat(args) => {
            let config = AppConfig::load(&config_path)?;
            run_chat(&config, cli.offline, args).await
        }
    }
}

async fn run_scan(config: &AppConfig, offline: bool, args: ScanArgs) -> Result<()> {
    let analyzer = build_analyzer(config, offline)?;
    let picker: Arc<dyn GalleryPicker> = match &args.gallery {
        Some(Some(path)) => Arc::new(FixedGalleryPicker::new(Some(path.clone()))),
        _ => Arc::new(StdinGalleryPicker),
    };
    let source = CommandCaptureSource::new(
        config.camera.command.clone(),
        config.camera.capture_dir(),
        Arc::new(StdinPermissionPrompt),
        picker,
    )
    .with_camera_timeout(config.camera.timeout);
    let journal = MarkdownJournal::new(config.journal.path());

    let mut scan = ScanController::new(Arc::new(source), analyzer, Arc::new(journal));

    let submitted = if args.gallery.is_some() {
        pick_loop(&mut scan).await?
    } else {
        camera_loop(&mut scan).await?
    };
    if !submitted {
        println!("scan cancelled");
        return Ok(());
    }

    loop {
        eprintln!("analyzing... (ctrl-c to leave)");
        let update = tokio::select! {
            update = scan.next_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(update) = update else {
            scan.abandon();
            println!("left the scan; the pending result will be ignored");
            return Ok(());
        };

        match update {
            Some(ScanUpdate::ResultReady) => break,
            Some(ScanUpdate::Failed(notice)) => {
                print_notice(&notice);
                let retry = confirm("try again? [y/N] ").await?
                    && if args.gallery.is_some() {
                        pick_loop(&mut scan).await?
                    } else {
                        capture_once(&mut scan).await?
                    };
                if !retry {
                    scan.cancel_capture()?;
                    println!("scan cancelled");
                    return Ok(());
                }
            }
            Some(ScanUpdate::Stale) | None => return Ok(()),
        }
    }

    if let Some(result) = scan.session().result() {
        let token = result.presentation();
        let band = result.band();
        println!(
            "stress {}% ({}) · mood {} {}",
            result.stress_level,
            band.label(),
            token.emoji(),
            token.descriptor()
        );
        println!("{}", result.explanation);
    }

    let note = read_line("add a note (enter to skip): ").await?.unwrap_or_default();
    if !note.trim().is_empty() {
        scan.set_journal_note(note)?;
    }

    if confirm("save to journal? [y/N] ").await? {
        match scan.save().await? {
            Some(notice) => print_notice(&notice),
            None => println!("saved to {}", config.journal.path().display()),
        }
    } else {
        scan.discard()?;
        println!("discarded");
    }
    Ok(())
}

/// Resolves permission and captures. Returns false if the user gives up.
async fn camera_loop(scan: &mut ScanController) -> Result<bool> {
    loop {
        match scan.open_camera().await? {
            None => break,
            Some(notice) => {
                print_notice(&notice);
                if !confirm("ask for camera access again? [y/N] ").await? {
                    scan.cancel_capture()?;
                    return Ok(false);
                }
            }
        }
    }
    capture_once(scan).await
}

async fn capture_once(scan: &mut ScanController) -> Result<bool> {
    loop {
        let Some(input) = read_line("press enter to capture, q to cancel: ").await? else {
            scan.cancel_capture()?;
            return Ok(false);
        };
        if input.trim().eq_ignore_ascii_case("q") {
            scan.cancel_capture()?;
            return Ok(false);
        }
        match scan.capture().await {
            Ok(_) => return Ok(true),
            Err(ScanError::Capture(err)) => eprintln!("capture failed: {err}"),
            Err(err) => return Err(err.into()),
        }
    }
}

async fn pick_loop(scan: &mut ScanController) -> Result<bool> {
    match scan.pick_from_gallery().await {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Ok(false),
        Err(ScanError::Capture(err)) => {
            eprintln!("could not use that image: {err}");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

enum ChatEvent {
    Input(Option<String>),
    Reply(Option<ReplyUpdate>),
}

async fn run_chat(config: &AppConfig, offline: bool, args: ChatArgs) -> Result<()> {
    let companion = build_companion(config, offline)?;
    let mut chat = ConversationController::new(companion)
        .with_session(ConversationSession::with_greeting(GREETING));
    chat.set_context_stress_level(args.stress_level);

    let mut line_rx = spawn_line_reader(io::BufReader::new(io::stdin()))?;

    eprintln!("type a message, /quit to leave");
    for message in chat.session().messages() {
        print_message(message);
    }
    let mut input_open = true;
    loop {
        if !input_open && chat.awaiting_replies() == 0 {
            break;
        }
        let awaiting = chat.awaiting_replies() > 0;
        let event = tokio::select! {
            line = line_rx.recv(), if input_open => ChatEvent::Input(line),
            update = chat.next_update(), if awaiting => ChatEvent::Reply(update),
        };

        match event {
            ChatEvent::Input(Some(line)) if line.trim() == "/quit" => break,
            ChatEvent::Input(Some(line)) => {
                if let Some(id) = chat.send(&line)
                    && let Some(message) = chat.session().message(id)
                {
                    print_message(message);
                }
            }
            ChatEvent::Input(None) => input_open = false,
            ChatEvent::Reply(Some(ReplyUpdate::Appended(id))) => {
                if let Some(message) = chat.session().message(id) {
                    print_message(message);
                }
            }
            ChatEvent::Reply(Some(ReplyUpdate::Failed(notice))) => {
                eprintln!("! {}", notice.message)
            }
            ChatEvent::Reply(_) => {}
        }
    }
    Ok(())
}

/// Forwards lines from `reader` until it ends or the receiver is dropped.
///
/// Runs on a detached thread rather than the blocking pool: a read parked on
/// stdin must not hold up runtime shutdown after `/quit`.
fn spawn_line_reader<R>(reader: R) -> Result<mpsc::UnboundedReceiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else {
                    break;
                };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to start stdin reader")?;
    Ok(line_rx)
}

fn build_analyzer(config: &AppConfig, offline: bool) -> Result<Arc<dyn Analyzer>> {
    if offline || config.scan.mode == BackendMode::Scripted {
        return Ok(Arc::new(ScriptedAnalyzer::placeholder()));
    }
    let analyzer = HttpAnalyzer::new(&config.service_config())
        .context("failed to initialize analysis client")?;
    Ok(Arc::new(analyzer))
}

fn build_companion(config: &AppConfig, offline: bool) -> Result<Arc<dyn Companion>> {
    if offline || config.companion.mode == BackendMode::Scripted {
        return Ok(Arc::new(ScriptedCompanion::new(
            config.companion.reply_delay,
            config.companion.style,
        )));
    }
    let companion = HttpCompanion::new(&config.service_config())
        .context("failed to initialize companion client")?;
    Ok(Arc::new(companion))
}

fn print_message(message: &Message) {
    match message.sender {
        Sender::User => println!("[you]  {}", message.text),
        Sender::Companion => println!("[twin] {}", message.text),
    }
}

fn print_notice(notice: &ScanNotice) {
    match notice {
        ScanNotice::PermissionDenied => {
            eprintln!("camera access was denied; grant it to take a scan")
        }
        ScanNotice::AnalysisFailed { kind, message } => {
            if *kind == FailureKind::Protocol {
                eprintln!("{message} (unexpected service response)");
            } else {
                eprintln!("{message}");
            }
        }
        ScanNotice::JournalSaveFailed { message } => eprintln!("{message}"),
    }
}

/// Prints a prompt and reads one line. `None` on end of input.
async fn read_line(prompt: &str) -> Result<Option<String>> {
    eprint!("{prompt}");
    io::stderr().flush().ok();
    tokio::task::spawn_blocking(|| -> Result<Option<String>> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    })
    .await
    .context("stdin task failed")?
}

async fn confirm(prompt: &str) -> Result<bool> {
    Ok(read_line(prompt)
        .await?
        .is_some_and(|answer| matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")))
}

struct StdinPermissionPrompt;

#[async_trait]
impl PermissionPrompt for StdinPermissionPrompt {
    async fn request(&self) -> PermissionStatus {
        match confirm("allow camera access? [y/N] ").await {
            Ok(true) => PermissionStatus::Granted,
            _ => PermissionStatus::Denied,
        }
    }
}

struct StdinGalleryPicker;

#[async_trait]
impl GalleryPicker for StdinGalleryPicker {
    async fn pick(&self) -> Option<PathBuf> {
        read_line("image path (enter to cancel): ")
            .await
            .ok()
            .flatten()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }
}

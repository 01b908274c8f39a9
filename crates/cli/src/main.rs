use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use scribe_core::domain::job::{JobRequest, JobSnapshot, JobState};
use scribe_core::domain::settings::AppSettings;
use scribe_core::domain::types::AudioFile;
use scribe_core::infra::transport::{HttpTransport, ScriptedTransport, TranscriptionTransport};
use scribe_core::usecase::orchestrator::JobOrchestrator;

/// Submit audio for transcription and follow the job until it finishes.
#[derive(Parser)]
#[command(name = "scribe")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (JSON). Defaults to <config dir>/scribe/settings.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the poll attempt ceiling.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Override the fixed delay between status polls.
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Use an in-memory transport that answers with the bundled sample.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print snapshots as JSON lines.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe the pre-canned sample recording.
    Sample,
    /// Upload an audio file and transcribe it.
    Upload {
        path: PathBuf,

        /// MIME type (guessed from the extension when omitted).
        #[arg(long)]
        mime: Option<String>,
    },
}

const DRY_RUN_PENDING_POLLS: usize = 2;
const DRY_RUN_POLL_INTERVAL_MS: u64 = 500;

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// ジョブが Succeeded で終わったら true
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let request = match &cli.command {
        Command::Sample => JobRequest::Sample,
        Command::Upload { path, mime } => JobRequest::Upload(read_audio(
            path,
            mime.as_deref(),
            settings.orchestrator.max_upload_bytes,
        )?),
    };

    let transport: Arc<dyn TranscriptionTransport> = if cli.dry_run {
        Arc::new(ScriptedTransport::demo(DRY_RUN_PENDING_POLLS)?)
    } else {
        Arc::new(HttpTransport::new(settings.transport.clone())?)
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(follow_job(transport, settings, request, cli.json))
}

fn load_settings(cli: &Cli) -> Result<AppSettings, Box<dyn std::error::Error>> {
    let mut settings = AppSettings::load(cli.config.as_deref())?;
    if cli.dry_run {
        settings.orchestrator.poll_interval_ms = DRY_RUN_POLL_INTERVAL_MS;
    }
    if let Some(n) = cli.max_attempts {
        settings.orchestrator.max_attempts = n;
    }
    if let Some(ms) = cli.poll_interval_ms {
        settings.orchestrator.poll_interval_ms = ms;
    }
    settings.validate()?;
    Ok(settings)
}

async fn follow_job(
    transport: Arc<dyn TranscriptionTransport>,
    settings: AppSettings,
    request: JobRequest,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let (orchestrator, mut snapshots) = JobOrchestrator::new(transport, settings.orchestrator);
    log::info!(
        "Polling every {} ms, giving up after {:?}",
        orchestrator.settings().poll_interval_ms,
        orchestrator.effective_timeout()
    );

    if let Err(e) = orchestrator.start(request).await {
        // 検証エラーのスナップショットも表示してから終了する
        while let Ok(snapshot) = snapshots.try_recv() {
            print_snapshot(&snapshot, json)?;
        }
        return Err(e.into());
    }

    // テキスト出力ではフレーズは経過時間で切り替える（ポーリング行は回数のみ）
    let mut ticker = tokio::time::interval(orchestrator.settings().message_cycle());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut polling_since: Option<tokio::time::Instant> = None;
    let mut shown = String::new();

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                let Some(snapshot) = snapshot else {
                    return Ok(false);
                };
                print_snapshot(&snapshot, json)?;
                if snapshot.state.is_terminal() {
                    return Ok(snapshot.state == JobState::Succeeded);
                }
                if snapshot.state == JobState::Polling {
                    polling_since.get_or_insert_with(tokio::time::Instant::now);
                }
            }
            _ = ticker.tick(), if !json && polling_since.is_some() => {
                let elapsed = polling_since.map(|t| t.elapsed()).unwrap_or_default();
                let phrase = orchestrator.narrator().phrase_for_elapsed(elapsed);
                if phrase != shown {
                    println!("[{}] {phrase}", JobState::Polling.as_str());
                    shown = phrase.to_string();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, cancelling job");
                orchestrator.cancel().await;
            }
        }
    }
}

fn print_snapshot(snapshot: &JobSnapshot, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    match snapshot.state {
        JobState::Succeeded => {
            println!("[{}] {}", snapshot.state.as_str(), snapshot.phrase);
            if let Some(result) = &snapshot.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }
        JobState::Polling => println!("[{}] attempt {}", snapshot.state.as_str(), snapshot.attempt),
        _ => match &snapshot.error {
            Some(error) => println!("[{}] {}", snapshot.state.as_str(), error.message),
            None => println!("[{}] {}", snapshot.state.as_str(), snapshot.phrase),
        },
    }
    Ok(())
}

/// 上限を超えるファイルは読み込まず、サイズだけ渡して検証で弾かせる
fn read_audio(
    path: &Path,
    mime: Option<&str>,
    max_bytes: u64,
) -> Result<AudioFile, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("Input file not found: {}", path.display()).into());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| format!("Invalid file name: {}", path.display()))?;
    let size = std::fs::metadata(path)?.len();
    let data = if size <= max_bytes {
        std::fs::read(path)?
    } else {
        Vec::new()
    };

    Ok(AudioFile {
        name,
        mime_type: mime.map(str::to_string).unwrap_or_else(|| guess_mime(path)),
        size,
        data,
    })
}

fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "mp4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
    .to_string()
}

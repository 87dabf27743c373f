use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod api_client;
mod artifact;
mod config;
mod download;
mod error;
mod progress;
mod qa;
mod recording;
mod session;
mod upload;

use api_client::ApiClient;
use artifact::{AudioArtifact, DocumentArtifact};
use config::read_app_config;
use progress::{ProgressEvent, StageTracker, PROCESSING_ERROR};
use qa::{QaClient, QaSettings, SettingsStore};
use recording::VoiceRecorder;
use session::SessionManager;
use upload::{UploadRequest, Uploader, VoiceCredentials, VoiceSource, VoiceTrack};

/// Turn a slide deck into a narrated video and chat about its content.
#[derive(Debug, Parser)]
#[command(name = "maestro", version)]
struct Args {
    /// Slide deck to narrate (PDF).
    pdf: PathBuf,

    /// Clone the narration voice from an MP3 sample.
    #[arg(long, conflicts_with = "record")]
    voice_file: Option<PathBuf>,

    /// Record a voice sample from the microphone for cloning.
    #[arg(long)]
    record: bool,

    /// Play.ht API key, required for voice cloning.
    #[arg(long, env = "PLAYHT_API_KEY")]
    playht_api_key: Option<String>,

    /// Play.ht user id, required for voice cloning.
    #[arg(long, env = "PLAYHT_USER_ID")]
    playht_user_id: Option<String>,

    /// OpenAI API key for the backend session (used when the session does
    /// not already hold one).
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Override the backend base URL from config.json.
    #[arg(long)]
    base_url: Option<String>,

    /// Exit after the video downloads instead of opening the Q&A prompt.
    #[arg(long)]
    no_chat: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maestro=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut app_config = read_app_config();
    if let Some(base_url) = &args.base_url {
        app_config.base_url = base_url.clone();
    }

    let api = ApiClient::new(&app_config.base_url)?;
    let session = SessionManager::new(api.clone());

    // Bounded bootstrap: an unreachable backend fails here, not mid-upload.
    let info = session
        .check(Duration::from_secs(app_config.bootstrap_timeout_secs))
        .await?;

    if !session.is_established() {
        let Some(api_key) = &args.api_key else {
            bail!("No API key in the backend session. Pass --api-key or set OPENAI_API_KEY.");
        };
        session.setup_api_key(api_key).await?;
        println!("API key set.");
    }

    let document = DocumentArtifact::from_pdf_path(&args.pdf)?;
    let voice = build_voice_track(&args, &info, &app_config).await?;

    let uploader = Uploader::new(api.clone(), session.established());
    let handle = uploader.submit(UploadRequest { document, voice }).await?;
    println!("Upload accepted, generating video...");

    let video_location = watch_progress(handle).await?;
    println!("Process complete.");

    let output_path = download::download_video(
        &api,
        &video_location,
        PathBuf::from(&app_config.download_dir).as_path(),
    )
    .await?;
    println!("Video saved to {}", output_path.display());

    if !args.no_chat {
        chat_loop(api.clone(), &session, app_config.qa_threshold).await?;
    }
    Ok(())
}

/// Chooses between the default narration voice and a custom-cloned one from
/// an uploaded file or a fresh microphone recording.
async fn build_voice_track(
    args: &Args,
    info: &session::SessionInfo,
    app_config: &config::AppConfig,
) -> anyhow::Result<VoiceTrack> {
    let (artifact, source) = if args.record {
        (
            Some(record_voice_sample(app_config).await?),
            VoiceSource::Record,
        )
    } else if let Some(path) = &args.voice_file {
        (
            Some(AudioArtifact::from_mp3_path(path)?),
            VoiceSource::Upload,
        )
    } else {
        return Ok(VoiceTrack::Default);
    };

    // Credentials fall back to the pair the backend session already stores.
    let credentials = VoiceCredentials {
        api_key: args
            .playht_api_key
            .clone()
            .or_else(|| info.playht_api_key.clone())
            .unwrap_or_default(),
        user_id: args
            .playht_user_id
            .clone()
            .or_else(|| info.playht_user_id.clone())
            .unwrap_or_default(),
    };

    Ok(VoiceTrack::Custom {
        artifact,
        source,
        credentials,
    })
}

/// Records from the microphone until the user presses Enter.
async fn record_voice_sample(app_config: &config::AppConfig) -> anyhow::Result<AudioArtifact> {
    let mut recorder = VoiceRecorder::new(app_config.recording.clone());
    recorder.start()?;
    println!("Recording... press Enter to stop.");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    match recorder.stop().await? {
        Some(artifact) => {
            println!("Recorded {} bytes of audio.", artifact.bytes.len());
            Ok(artifact)
        }
        None => bail!("No recording was active."),
    }
}

/// Consumes the progress channel until a terminal event, rendering stage
/// transitions as they arrive.
async fn watch_progress(handle: upload::RunHandle) -> anyhow::Result<String> {
    let mut rx = progress::subscribe(handle);
    let mut tracker = StageTracker::new();

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Stage(stage) => {
                if tracker.observe(stage) {
                    if let Some(done) = previous_stage(stage) {
                        println!("  [done] {}", done.done_label());
                    }
                    println!("  [....] {}", stage.active_label());
                }
            }
            ProgressEvent::Indeterminate(text) => println!("  {}", text),
            ProgressEvent::Complete { video_location } => {
                if let Some(stage) = tracker.current() {
                    println!("  [done] {}", stage.done_label());
                }
                return Ok(video_location);
            }
            ProgressEvent::Failed { message } => bail!(message),
        }
    }
    // Receiver closed without a terminal event.
    Err(error::Error::ChannelFailure(PROCESSING_ERROR.to_string()).into())
}

fn previous_stage(stage: progress::PipelineStage) -> Option<progress::PipelineStage> {
    progress::PipelineStage::from_number(stage.number().checked_sub(1)?)
}

/// Interactive Q&A over the generated content. One question is outstanding
/// at a time; the loop is sequential so a new one cannot start early.
async fn chat_loop(
    api: ApiClient,
    session: &SessionManager,
    initial_threshold: f64,
) -> anyhow::Result<()> {
    let qa = QaClient::new(api.clone());
    let mut settings = SettingsStore::new(api, QaSettings::new(initial_threshold));

    println!(
        "Ask questions about the content. /threshold <value> tunes relevance, \
         /clear drops the backend session, /quit exits."
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let line = line.trim().to_string();

        if line == "/quit" {
            return Ok(());
        }
        if line == "/clear" {
            // Also removes the server-side copy of the generated video.
            session.clear().await?;
            println!("Session cleared.");
            return Ok(());
        }
        if let Some(value) = line.strip_prefix("/threshold") {
            let draft = match value.trim().parse::<f64>() {
                Ok(threshold) => QaSettings {
                    threshold,
                    ..settings.committed().clone()
                },
                Err(_) => {
                    println!("Usage: /threshold <0.01-0.10>");
                    continue;
                }
            };
            match settings.save(draft).await {
                Ok(()) => println!("Threshold set to {:.2}.", settings.committed().threshold),
                Err(e) => println!("{}", e),
            }
            continue;
        }

        match qa.ask(&line).await {
            Ok(answer) => println!("{}", answer),
            Err(e) => println!("{}", e),
        }
    }
}

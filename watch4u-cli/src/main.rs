use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use watch4u_client::hardware::{
    Camera, CameraSession, HardwareError, ImageSource, NfcRadio, NfcTagReader, RadioSession,
};
use watch4u_client::{
    ApiRosterSource, ApiSelfieSubmitter, CapturedImage, CheckInCoordinator, CheckInError,
    CheckInHistory, CheckInState, EffectContext, ExamId, RosterTagVerifier, SqliteHistory,
    TagSerial, UserId,
};
use watch4u_core::api::sort_by_seat;
use watch4u_core::{ApiError, Config, ExamApiClient, Session, SessionStore};

/// Watch4u: exam check-in from the invigilator's desk
#[derive(Parser, Debug)]
#[command(name = "watch4u")]
#[command(about = "Exam check-in from the invigilator's desk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in to the exam service and save the session
    Login(LoginArgs),
    /// Discard the saved session
    Logout,
    /// List the exams available to the signed-in invigilator
    Exams,
    /// Print the roster for an exam, ordered by seat
    Roster(RosterArgs),
    /// Bind a tag serial to a candidate
    SetTag(SetTagArgs),
    /// Run a check-in at the desk
    CheckIn(CheckInArgs),
    /// Show check-ins recorded on this machine
    History(HistoryArgs),
}

#[derive(Parser, Debug)]
struct LoginArgs {
    /// Email address to sign in with
    #[arg(long)]
    email: String,

    /// Password (falls back to the WATCH4U_PASSWORD environment variable)
    #[arg(long, env = "WATCH4U_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Parser, Debug)]
struct RosterArgs {
    /// Exam to print the roster for
    exam_id: String,
}

#[derive(Parser, Debug)]
struct SetTagArgs {
    /// Exam the binding applies to
    exam_id: String,

    /// Candidate to bind the tag to
    #[arg(long)]
    user_id: String,

    /// Tag serial number, as the radio reports it
    #[arg(long)]
    tag: String,
}

#[derive(Parser, Debug)]
struct CheckInArgs {
    /// Exam to check candidates into
    exam_id: String,

    /// Candidate to check in (defaults to the signed-in user)
    #[arg(long)]
    user_id: Option<String>,

    /// Image file standing in for the desk camera
    #[arg(long)]
    image: PathBuf,

    /// Skip the radio prompt and use this tag serial directly
    #[arg(long)]
    tag: Option<String>,
}

#[derive(Parser, Debug)]
struct HistoryArgs {
    /// Only show check-ins for this exam
    #[arg(long)]
    exam_id: Option<String>,

    /// Maximum number of check-ins to show
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

const MAX_SUBMIT_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;

/// Reads tag serials typed at the desk, standing in for the NFC radio.
struct PromptTagReader;

#[async_trait]
impl NfcTagReader for PromptTagReader {
    async fn read_tag(&self, _session: &RadioSession) -> Result<TagSerial, HardwareError> {
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| HardwareError::ReadFailed(e.to_string()))?
        .map_err(|e| HardwareError::ReadFailed(e.to_string()))?;

        let serial = line.trim();
        if serial.is_empty() {
            return Err(HardwareError::ReadFailed("empty tag serial".to_string()));
        }
        Ok(TagSerial::from(serial))
    }
}

/// Captures the "camera" image by reading a file from disk.
struct FileImageSource {
    path: PathBuf,
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn capture(&self, _session: &CameraSession) -> Result<CapturedImage, HardwareError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| HardwareError::ReadFailed(format!("{}: {}", self.path.display(), e)))?;
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("selfie.jpg")
            .to_string();
        Ok(CapturedImage { file_name, bytes })
    }
}

/// Load the saved session or explain how to get one.
fn require_session(store: &SessionStore) -> Result<Session> {
    store
        .load()?
        .context("Not signed in. Run `watch4u login` first.")
}

/// Build an API client that authenticates with the saved session.
fn authed_client(config: &Config, store: &SessionStore) -> Result<ExamApiClient> {
    let session = require_session(store)?;
    ExamApiClient::with_token(config.clone(), session.token)
        .context("Failed to build the API client")
}

/// Discard the session and explain that a fresh sign-in is needed.
fn session_expired(store: &SessionStore) -> anyhow::Error {
    if let Err(e) = store.clear() {
        eprintln!("Warning: failed to discard the stale session: {:#}", e);
    }
    anyhow!("Session expired or revoked. Run `watch4u login` again.")
}

/// Translate an API failure, discarding the session when the server no
/// longer accepts it.
fn api_failure(store: &SessionStore, error: ApiError) -> anyhow::Error {
    match error {
        ApiError::Unauthorized => session_expired(store),
        e => anyhow::Error::from(e),
    }
}

async fn run_login(config: Config, args: LoginArgs) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let client = ExamApiClient::new(config).context("Failed to build the API client")?;

    let session = match client.login(&args.email, &args.password).await {
        Ok(session) => session,
        Err(ApiError::Credentials(message)) => bail!("Sign-in rejected: {}", message),
        Err(e) => return Err(anyhow::Error::from(e).context("Sign-in failed")),
    };

    store.save(&session)?;
    println!("Signed in as {} ({})", args.email, session.role);
    Ok(())
}

fn run_logout(config: Config) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    store.clear()?;
    println!("Signed out.");
    Ok(())
}

async fn run_exams(config: Config) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let client = authed_client(&config, &store)?;

    let exams = match client.list_exams().await {
        Ok(exams) => exams,
        Err(e) => return Err(api_failure(&store, e)),
    };

    if exams.is_empty() {
        println!("No exams available.");
        return Ok(());
    }
    for exam in exams {
        let rooms: Vec<&str> = exam.room.iter().map(|r| r.name.as_str()).collect();
        println!(
            "{:>4}  {} {}-{}  {} [{}]",
            exam.id,
            exam.date,
            exam.start_time,
            exam.end_time,
            exam.title,
            rooms.join(", ")
        );
    }
    Ok(())
}

async fn run_roster(config: Config, args: RosterArgs) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let client = authed_client(&config, &store)?;

    let mut entries = match client.fetch_roster(&args.exam_id).await {
        Ok(entries) => entries,
        Err(e) => return Err(api_failure(&store, e)),
    };
    sort_by_seat(&mut entries);

    if entries.is_empty() {
        println!("Roster for exam {} is empty.", args.exam_id);
        return Ok(());
    }
    for entry in entries {
        let seat = entry.seat.as_deref().unwrap_or("-");
        let tag = entry.tag_serial_number.as_deref().unwrap_or("no tag");
        let status = match entry.check_in_time.as_deref() {
            Some(time) => format!("checked in at {}", time),
            None => "not checked in".to_string(),
        };
        println!("{:>6}  {}  [{}]  {}", seat, entry.email, tag, status);
    }
    Ok(())
}

async fn run_set_tag(config: Config, args: SetTagArgs) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let client = authed_client(&config, &store)?;

    match client
        .set_tag(&args.exam_id, &args.user_id, &args.tag)
        .await
    {
        Ok(()) => {
            println!("Bound tag {} to user {}.", args.tag, args.user_id);
            Ok(())
        }
        Err(e) => Err(api_failure(&store, e)),
    }
}

async fn run_check_in(config: Config, args: CheckInArgs) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let session = require_session(&store)?;
    let user_id = args.user_id.clone().unwrap_or_else(|| session.user_id.clone());
    let client = Arc::new(
        ExamApiClient::with_token(config.clone(), session.token)
            .context("Failed to build the API client")?,
    );

    let history = SqliteHistory::new(&config.history_db_path())?;
    let ctx = EffectContext {
        roster_source: Arc::new(ApiRosterSource::new(client.clone())),
        verifier: Arc::new(RosterTagVerifier),
        submitter: Arc::new(ApiSelfieSubmitter::new(client)),
        history: Arc::new(history),
        request_timeout: config.request_timeout,
    };
    let coordinator = CheckInCoordinator::new(ctx);

    match coordinator
        .start(ExamId::from(args.exam_id.as_str()), UserId(user_id))
        .await
    {
        Ok(_) => {}
        Err(CheckInError::Rejected(reason)) => bail!("Check-in refused: {}", reason),
        Err(CheckInError::SessionExpired) => return Err(session_expired(&store)),
        Err(e) => bail!("Could not start the check-in: {}", e),
    }

    let candidate = {
        let radio = NfcRadio::new();
        let session = radio
            .try_begin_session()
            .map_err(|e| anyhow!("NFC radio unavailable: {}", e))?;
        let reader = PromptTagReader;

        loop {
            let tag = match &args.tag {
                Some(serial) => TagSerial::from(serial.as_str()),
                None => {
                    eprint!("Scan a tag (enter the serial): ");
                    std::io::stderr().flush().ok();
                    reader
                        .read_tag(&session)
                        .await
                        .map_err(|e| anyhow!("Tag read failed: {}", e))?
                }
            };

            match coordinator.submit_tag_scan(tag).await {
                Ok(CheckInState::AwaitingSelfie { candidate, .. }) => break candidate,
                Ok(state) => bail!("Check-in did not continue: {}", state.describe()),
                Err(CheckInError::Rejected(reason)) => {
                    if reason.is_unrecoverable() || args.tag.is_some() {
                        bail!("Tag rejected: {}", reason);
                    }
                    eprintln!("Tag rejected: {}. Scan another.", reason);
                }
                Err(CheckInError::TransientFailure(cause)) => {
                    if args.tag.is_some() {
                        bail!("Tag verification failed: {}", cause);
                    }
                    eprintln!("Tag verification failed: {}. Scan again.", cause);
                }
                Err(CheckInError::SessionExpired) => return Err(session_expired(&store)),
                Err(e) => bail!("{}", e),
            }
        }
    };

    println!(
        "Verified {} (seat {}).",
        candidate.email,
        candidate.seat.as_deref().unwrap_or("unassigned")
    );

    let image = {
        let camera = Camera::new();
        let session = camera
            .try_begin_session()
            .map_err(|e| anyhow!("Camera unavailable: {}", e))?;
        let source = FileImageSource {
            path: args.image.clone(),
        };
        source
            .capture(&session)
            .await
            .map_err(|e| anyhow!("Image capture failed: {}", e))?
    };

    let mut attempts = 0;
    let state = loop {
        attempts += 1;
        match coordinator.submit_selfie(image.clone()).await {
            Ok(state) => break state,
            Err(CheckInError::TransientFailure(cause)) if attempts < MAX_SUBMIT_ATTEMPTS => {
                eprintln!(
                    "Submission failed (attempt {}/{}): {}. Retrying.",
                    attempts, MAX_SUBMIT_ATTEMPTS, cause
                );
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
            }
            Err(CheckInError::SessionExpired) => return Err(session_expired(&store)),
            Err(e) => bail!("Selfie submission failed: {}", e),
        }
    };

    match state {
        CheckInState::Complete {
            candidate,
            image_url,
            ..
        } => {
            println!("Checked in {}.", candidate.email);
            if let Some(url) = image_url {
                println!("Selfie stored at {}", url);
            }
            Ok(())
        }
        state => bail!("Check-in did not complete: {}", state.describe()),
    }
}

async fn run_history(config: Config, args: HistoryArgs) -> Result<()> {
    let history = SqliteHistory::new(&config.history_db_path())?;
    let mut records = match &args.exam_id {
        Some(exam_id) => history.for_exam(exam_id).await?,
        None => history.recent(args.limit).await?,
    };
    records.truncate(args.limit);

    if records.is_empty() {
        println!("No check-ins recorded.");
        return Ok(());
    }
    for record in records {
        let when = record
            .completed_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M");
        let seat = record.seat.as_deref().unwrap_or("-");
        println!(
            "{}  exam {}  seat {:>4}  {}  tag {}",
            when, record.exam_id, seat, record.email, record.tag_serial
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WATCH4U_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Login(args) => run_login(config, args).await,
        Commands::Logout => run_logout(config),
        Commands::Exams => run_exams(config).await,
        Commands::Roster(args) => run_roster(config, args).await,
        Commands::SetTag(args) => run_set_tag(config, args).await,
        Commands::CheckIn(args) => run_check_in(config, args).await,
        Commands::History(args) => run_history(config, args).await,
    }
}

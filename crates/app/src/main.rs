use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use practice_core::model::{
    GradedAnswer, Question, SessionMode, SessionSummary, TimedConfig, UnitId, UserId,
};
use services::app_services::question_service_from;
use services::sessions::{Advance, PracticeEngine, SessionProgress, SubmitOutcome};
use services::{EngineConfig, InMemoryQuestionService, PracticeServices, QuestionService};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCount { raw: String },
    InvalidTimer { raw: String },
    InvalidDbUrl { raw: String },
    InvalidId { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidTimer { raw } => write!(f, "invalid --timed value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  practice [practice] [--db <sqlite_url>] [--unit <id>] [--count <n>] [--timed <secs>]"
    );
    eprintln!("                      [--bank <questions.json>] [--user <id>]");
    eprintln!("  practice reset      [--db <sqlite_url>] [--unit <id>]");
    eprintln!();
    eprintln!("Without --unit the session mixes all units.");
    eprintln!("Without --bank questions come from PRACTICE_API_URL.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:practice.sqlite3");
    eprintln!("  --count PRACTICE_TARGET_COUNT or 10");
    eprintln!("  --user local");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRACTICE_DB_URL, PRACTICE_USER_ID, PRACTICE_API_URL, PRACTICE_API_TOKEN,");
    eprintln!("  PRACTICE_TARGET_COUNT, PRACTICE_REQUEST_TIMEOUT_SECS, PRACTICE_PROMOTE_AFTER,");
    eprintln!("  PRACTICE_DEMOTE_AFTER, PRACTICE_PREFETCH, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    mode: SessionMode,
    count: u32,
    timed: Option<TimedConfig>,
    bank_path: Option<String>,
    user_id: UserId,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        config: &EngineConfig,
    ) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PRACTICE_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("practice.sqlite3".into()), normalize_sqlite_url);
        let mut user_id = std::env::var("PRACTICE_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new("local"));
        let mut mode = SessionMode::Mixed;
        let mut count = config.target_question_count;
        let mut timed = None;
        let mut bank_path = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--unit" => {
                    let value = require_value(args, "--unit")?;
                    let unit_id = value.parse::<UnitId>().map_err(|_| ArgsError::InvalidId {
                        flag: "--unit",
                        raw: value.clone(),
                    })?;
                    mode = SessionMode::SingleUnit(unit_id);
                }
                "--count" => {
                    let value = require_value(args, "--count")?;
                    count = value
                        .parse::<u32>()
                        .ok()
                        .filter(|count| *count > 0)
                        .ok_or(ArgsError::InvalidCount { raw: value })?;
                }
                "--timed" => {
                    let value = require_value(args, "--timed")?;
                    let seconds = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidTimer { raw: value.clone() })?;
                    timed = Some(
                        TimedConfig::new(seconds)
                            .map_err(|_| ArgsError::InvalidTimer { raw: value })?,
                    );
                }
                "--bank" => bank_path = Some(require_value(args, "--bank")?),
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = value.parse::<UserId>().map_err(|_| ArgsError::InvalidId {
                        flag: "--user",
                        raw: value.clone(),
                    })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            mode,
            count,
            timed,
            bank_path,
            user_id,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── TERMINAL ──────────────────────────────────────────────────────────────────
//

/// Forward stdin lines into a channel so the countdown can race them.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn option_label(idx: usize) -> char {
    u8::try_from(idx)
        .ok()
        .and_then(|idx| b'A'.checked_add(idx))
        .map_or('?', char::from)
}

fn print_question(question: &Question, progress: Option<SessionProgress>, seconds: Option<u32>) {
    println!();
    if let Some(progress) = progress {
        println!(
            "Question {} of {} [{}]",
            progress.answered + 1,
            progress.total,
            progress.difficulty
        );
    }
    println!(
        "{}",
        question
            .text_field("questionText")
            .unwrap_or_else(|| question.id.as_str())
    );
    if let Some(code) = question.text_field("codeSnippet") {
        println!();
        println!("{code}");
        println!();
    }
    if let Some(options) = question.payload.get("options").and_then(|v| v.as_array()) {
        for (idx, option) in options.iter().enumerate() {
            if let Some(text) = option.as_str() {
                println!("  {}) {text}", option_label(idx));
            }
        }
    }
    if let Some(seconds) = seconds {
        println!("You have {seconds} seconds.");
    }
    println!("Your answer:");
}

fn print_feedback(graded: &GradedAnswer) {
    if graded.is_correct {
        println!("Correct!");
    } else {
        println!("Not quite. The answer was {}.", graded.correct_answer);
    }
    if let Some(explanation) = &graded.explanation {
        println!("{explanation}");
    }
    println!("Level: {}", graded.difficulty);
}

fn print_summary(summary: &SessionSummary) {
    println!();
    println!(
        "Session complete: {}/{} correct ({:.0}%)",
        summary.correct_answers, summary.total_questions, summary.accuracy
    );
    for row in &summary.by_difficulty {
        println!(
            "  {:<6} {}/{}",
            row.difficulty.as_str(),
            row.tally.correct,
            row.tally.total
        );
    }
    for row in &summary.by_unit {
        println!(
            "  unit {} {}/{}",
            row.unit_id, row.tally.correct, row.tally.total
        );
    }
    for recommendation in &summary.recommendations {
        println!("- {recommendation}");
    }
}

/// Run the current question to a grade, offering retries on failure.
/// Returns `None` when input ends.
async fn answer_question(
    engine: &mut PracticeEngine,
    input: &mut mpsc::Receiver<String>,
) -> Option<GradedAnswer> {
    let mut outcome = engine.drive_question(input).await;
    loop {
        match outcome {
            Ok(graded) => return graded,
            Err(err) => {
                eprintln!("Could not submit: {err}");
                println!("Press Enter to retry.");
                input.recv().await?;
                outcome = match engine.retry_submission().await {
                    Ok(SubmitOutcome::Graded(graded)) => Ok(Some(graded)),
                    Ok(SubmitOutcome::Ignored(_)) => engine.drive_question(input).await,
                    Err(err) => Err(err),
                };
            }
        }
    }
}

/// Move to the next question or summary, offering retries on failure.
async fn advance(
    engine: &mut PracticeEngine,
    input: &mut mpsc::Receiver<String>,
) -> Option<Advance> {
    loop {
        match engine.next().await {
            Ok(advance) => return Some(advance),
            Err(err) => {
                eprintln!("Could not continue: {err}");
                println!("Press Enter to retry.");
                input.recv().await?;
            }
        }
    }
}

async fn practice(
    engine: &mut PracticeEngine,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = spawn_stdin_reader();
    let mut step = match engine
        .resume_or_start(args.mode.clone(), args.count, args.timed)
        .await
    {
        Ok(step) => step,
        // Resumed, but the next question could not be fetched yet.
        Err(err) if engine.session().is_some() => {
            eprintln!("Could not continue: {err}");
            println!("Press Enter to retry.");
            if input.recv().await.is_none() {
                return Ok(());
            }
            let Some(step) = advance(engine, &mut input).await else {
                println!("Progress saved. Run again to resume.");
                return Ok(());
            };
            step
        }
        Err(err) => return Err(err.into()),
    };

    loop {
        let question = match step {
            Advance::Question(question) => question,
            Advance::Completed(summary) => {
                print_summary(&summary);
                return Ok(());
            }
        };
        print_question(&question, engine.progress(), engine.remaining_seconds());

        let Some(graded) = answer_question(engine, &mut input).await else {
            println!("Progress saved. Run again to resume.");
            return Ok(());
        };
        print_feedback(&graded);

        println!("Press Enter to continue.");
        if input.recv().await.is_none() {
            println!("Progress saved. Run again to resume.");
            return Ok(());
        }
        let Some(next) = advance(engine, &mut input).await else {
            println!("Progress saved. Run again to resume.");
            return Ok(());
        };
        step = next;
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Practice,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Practice,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let config = EngineConfig::from_env();
    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter, &config).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let bank = parsed
        .bank_path
        .as_deref()
        .map(std::fs::read_to_string)
        .transpose()?;
    let question_service: Arc<dyn QuestionService> = match cmd {
        Command::Practice => question_service_from(bank.as_deref(), &config)?,
        Command::Reset => Arc::new(InMemoryQuestionService::new(Vec::new())),
    };

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = PracticeServices::new_sqlite(
        &parsed.db_url,
        question_service,
        parsed.user_id.clone(),
        config,
    )
    .await?;
    let mut engine = services.engine()?;

    match cmd {
        Command::Practice => practice(&mut engine, &parsed).await,
        Command::Reset => {
            let removed = engine.discard(&parsed.mode).await?;
            info!(removed, "reset requested");
            if removed {
                println!("Saved session discarded.");
            } else {
                println!("No saved session.");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("services=info,practice=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

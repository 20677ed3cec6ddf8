use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use exam_core::model::{QuestionDraft, QuestionSetId, SessionId, SessionMode};
use services::{Clock, SimulationConfig, SimulationLoopService};
use storage::repository::{QuestionSelector, Storage};
use tracing_subscriber::EnvFilter;

mod console;

const DEFAULT_DB_URL: &str = "sqlite://amiram.sqlite3";
const DEFAULT_LOG: &str = "warn";
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidMode { raw: String },
    InvalidSessionId { raw: String },
    InvalidDbUrl { raw: String },
    MissingFile,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --mode value: {raw} (expected exam or practice)")
            }
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid --resume value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingFile => write!(f, "import requires --file <path>"),
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

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  app run     [--db <sqlite_url>] [--set <id>] [--mode exam|practice] [--duration <secs>]"
    );
    eprintln!("              [--resume <session_id>] [--charge-offline]");
    eprintln!("  app import  [--db <sqlite_url>] --file <questions.json>");
    eprintln!("  app history [--db <sqlite_url>] [--limit <n>]");
    eprintln!();
    eprintln!("Every subcommand also accepts --log-level <filter>.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --set 1 --mode exam (duration from the mode)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  AMIRAM_DB_URL, AMIRAM_LOG (overridden by RUST_LOG)");
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunArgs {
    set_id: QuestionSetId,
    mode: SessionMode,
    duration: Option<u32>,
    resume: Option<SessionId>,
    charge_offline: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            set_id: QuestionSetId::new(1),
            mode: SessionMode::Exam,
            duration: None,
            resume: None,
            charge_offline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    Import { file: PathBuf },
    History { limit: u32 },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    db_url: String,
    log: String,
    command: Command,
}

impl Args {
    /// Parse everything after the program name. `env_db` and `env_log` carry
    /// `AMIRAM_DB_URL` and `AMIRAM_LOG`; flags win over them.
    fn parse(
        argv: Vec<String>,
        env_db: Option<String>,
        env_log: Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = env_db.map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut log = env_log.unwrap_or_else(|| DEFAULT_LOG.into());

        let mut iter = argv.into_iter().peekable();
        let has_subcommand = iter.peek().is_some_and(|first| !first.starts_with('-'));
        let name = if has_subcommand {
            iter.next().unwrap_or_default()
        } else {
            "run".to_string()
        };

        let mut run = RunArgs::default();
        let mut file = None;
        let mut limit = DEFAULT_HISTORY_LIMIT;
        let mut help = false;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut iter, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--log-level" => log = require_value(&mut iter, "--log-level")?,
                "--help" | "-h" => help = true,
                "--set" if name == "run" => {
                    let value = require_value(&mut iter, "--set")?;
                    run.set_id = QuestionSetId::new(parse_number(value, "--set")?);
                }
                "--mode" if name == "run" => {
                    let value = require_value(&mut iter, "--mode")?;
                    run.mode = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                }
                "--duration" if name == "run" => {
                    let value = require_value(&mut iter, "--duration")?;
                    let secs: u32 = parse_number(value.clone(), "--duration")?;
                    if secs == 0 {
                        return Err(ArgsError::InvalidNumber {
                            flag: "--duration",
                            raw: value,
                        });
                    }
                    run.duration = Some(secs);
                }
                "--resume" if name == "run" => {
                    let value = require_value(&mut iter, "--resume")?;
                    let id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSessionId { raw: value.clone() })?;
                    run.resume = Some(id);
                }
                "--charge-offline" if name == "run" => run.charge_offline = true,
                "--file" if name == "import" => {
                    file = Some(PathBuf::from(require_value(&mut iter, "--file")?));
                }
                "--limit" if name == "history" => {
                    limit = parse_number(require_value(&mut iter, "--limit")?, "--limit")?;
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = if help {
            Command::Help
        } else {
            match name.as_str() {
                "run" => Command::Run(run),
                "import" => Command::Import {
                    file: file.ok_or(ArgsError::MissingFile)?,
                },
                "history" => Command::History { limit },
                "help" => Command::Help,
                other => return Err(ArgsError::UnknownCommand(other.to_string())),
            }
        };

        Ok(Self {
            db_url,
            log,
            command,
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
            .unwrap_or_else(|_| PathBuf::from("."))
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

/// Logs go to stderr so they never interleave with the question screen.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn import_questions(
    storage: &Storage,
    file: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)?;
    let drafts: Vec<QuestionDraft> = serde_json::from_str(&raw)?;

    let mut questions = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let id = draft.id;
        let question = draft
            .validate()
            .map_err(|e| format!("question #{index} (id {id}): {e}"))?;
        questions.push(question);
    }

    for (position, question) in questions.iter().enumerate() {
        storage
            .catalog
            .upsert_question(question, u32::try_from(position)?)
            .await?;
    }
    tracing::info!(count = questions.len(), file = %file.display(), "questions imported");
    println!("imported {} questions from {}", questions.len(), file.display());
    Ok(())
}

async fn print_history(
    svc: &SimulationLoopService,
    limit: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = svc.history(limit).await?;
    if rows.is_empty() {
        println!("no finished simulations yet");
        return Ok(());
    }
    for row in rows {
        let s = &row.summary;
        println!(
            "#{:<4} {}  {:<8} {:>3}%  {}/{} correct  {} unanswered  {}s  ({})",
            row.id,
            s.completed_at().format("%Y-%m-%d %H:%M"),
            s.mode(),
            s.score_percent(),
            s.correct(),
            s.total_questions(),
            s.unanswered(),
            s.elapsed_seconds(),
            s.reason(),
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(
        argv,
        std::env::var("AMIRAM_DB_URL").ok(),
        std::env::var("AMIRAM_LOG").ok(),
    )
    .map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    if args.command == Command::Help {
        print_usage();
        return Ok(());
    }

    init_tracing(&args.log);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let config = match &args.command {
        Command::Run(run) => SimulationConfig::default().with_charge_offline_time(run.charge_offline),
        _ => SimulationConfig::default(),
    };
    let svc = SimulationLoopService::new(
        Clock::default_clock(),
        config,
        Arc::clone(&storage.questions),
        Arc::clone(&storage.snapshots),
        Arc::clone(&storage.results),
    );

    match args.command {
        Command::Run(run) => {
            let running = match run.resume {
                Some(id) => svc.resume(id).await?,
                None => {
                    let selector = QuestionSelector::for_set(run.set_id);
                    svc.start(&selector, run.mode, run.duration).await?
                }
            };
            console::drive(&svc, running).await
        }
        Command::Import { file } => import_questions(&storage, &file).await,
        Command::History { limit } => print_history(&svc, limit).await,
        Command::Help => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn bare_invocation_runs_default_exam() {
        let args = Args::parse(Vec::new(), None, None).unwrap();
        assert_eq!(args.command, Command::Run(RunArgs::default()));
        assert_eq!(args.db_url, DEFAULT_DB_URL);
        assert_eq!(args.log, DEFAULT_LOG);
    }

    #[test]
    fn run_flags_are_parsed() {
        let id = SessionId::generate();
        let args = Args::parse(
            argv(&[
                "run",
                "--set",
                "4",
                "--mode",
                "practice",
                "--duration",
                "300",
                "--resume",
                &id.to_string(),
                "--charge-offline",
            ]),
            None,
            Some("debug".into()),
        )
        .unwrap();
        assert_eq!(
            args.command,
            Command::Run(RunArgs {
                set_id: QuestionSetId::new(4),
                mode: SessionMode::Practice,
                duration: Some(300),
                resume: Some(id),
                charge_offline: true,
            })
        );
        assert_eq!(args.log, "debug");
    }

    #[test]
    fn flag_overrides_env_db_url() {
        let args = Args::parse(
            argv(&["history", "--db", "sqlite::memory:", "--limit", "3"]),
            Some("sqlite:///tmp/env.sqlite3".into()),
            None,
        )
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.command, Command::History { limit: 3 });
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            Args::parse(argv(&["run", "--duration", "0"]), None, None).unwrap_err(),
            ArgsError::InvalidNumber {
                flag: "--duration",
                raw: "0".into()
            }
        );
        assert_eq!(
            Args::parse(argv(&["run", "--mode", "quiz"]), None, None).unwrap_err(),
            ArgsError::InvalidMode { raw: "quiz".into() }
        );
        assert_eq!(
            Args::parse(argv(&["import"]), None, None).unwrap_err(),
            ArgsError::MissingFile
        );
        assert_eq!(
            Args::parse(argv(&["history", "--file", "x.json"]), None, None).unwrap_err(),
            ArgsError::UnknownArg("--file".into())
        );
        assert_eq!(
            Args::parse(argv(&["grade"]), None, None).unwrap_err(),
            ArgsError::UnknownCommand("grade".into())
        );
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/exam.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/exam.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }
}

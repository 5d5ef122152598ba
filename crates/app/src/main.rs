use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::{CategoryId, ChoiceId, Credentials, Question};
use quiz_core::timer::format_time;
use quiz_core::{QuizMode, QuizState, TimerMode};
use services::{
    AppServices, ClientConfig, Navigator, ProgressSync, QuizTimer, Route, TracingNotifier,
};
use storage::keys;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*};

const LETTERS: [&str; 8] = ["A", "B", "C", "D", "E", "F", "G", "H"];
const ENV_PASSWORD: &str = "QUIZ_PASSWORD";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidCategoryId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidCategoryId { raw } => write!(f, "invalid --category value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db-url value: {raw}"),
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
    eprintln!("  app login    --email <email> [--password <password>]");
    eprintln!("  app me");
    eprintln!("  app logout");
    eprintln!("  app practice --questions <file.json> [--category <id>] [--shuffle]");
    eprintln!();
    eprintln!("Every command accepts:");
    eprintln!("  --api-url <url>       backend base URL");
    eprintln!("  --db-url <sqlite_url> client state database");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_API_BASE_URL, QUIZ_DB_URL, QUIZ_HTTP_TIMEOUT_SECS, QUIZ_PASSWORD, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Login {
        email: String,
        password: String,
    },
    Me,
    Logout,
    Practice {
        questions: PathBuf,
        category: Option<CategoryId>,
        shuffle: bool,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Overrides {
    api_url: Option<String>,
    db_url: Option<String>,
}

#[derive(Debug)]
struct Args {
    overrides: Overrides,
    command: Command,
}

impl Args {
    fn parse(
        mut args: impl Iterator<Item = String>,
        password_env: Option<String>,
    ) -> Result<Self, ArgsError> {
        let name = args.next().ok_or(ArgsError::MissingArg { flag: "subcommand" })?;

        let mut overrides = Overrides::default();
        let mut email = None;
        let mut password = password_env;
        let mut questions = None;
        let mut category = None;
        let mut shuffle = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api-url" => overrides.api_url = Some(require_value(&mut args, "--api-url")?),
                "--db-url" => {
                    let value = require_value(&mut args, "--db-url")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    overrides.db_url = Some(normalize_sqlite_url(value));
                }
                "--email" if name == "login" => email = Some(require_value(&mut args, "--email")?),
                "--password" if name == "login" => {
                    password = Some(require_value(&mut args, "--password")?);
                }
                "--questions" if name == "practice" => {
                    questions = Some(PathBuf::from(require_value(&mut args, "--questions")?));
                }
                "--category" if name == "practice" => {
                    let value = require_value(&mut args, "--category")?;
                    let id = value
                        .parse::<CategoryId>()
                        .map_err(|_| ArgsError::InvalidCategoryId { raw: value.clone() })?;
                    category = Some(id);
                }
                "--shuffle" if name == "practice" => shuffle = true,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match name.as_str() {
            "login" => Command::Login {
                email: email.ok_or(ArgsError::MissingArg { flag: "--email" })?,
                password: password.ok_or(ArgsError::MissingArg { flag: "--password" })?,
            },
            "me" => Command::Me,
            "logout" => Command::Logout,
            "practice" => Command::Practice {
                questions: questions.ok_or(ArgsError::MissingArg { flag: "--questions" })?,
                category,
                shuffle,
            },
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        Ok(Self { overrides, command })
    }

    fn config(&self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        let mut config = ClientConfig::from_env()?;
        if let Some(api_url) = &self.overrides.api_url {
            config = config.with_api_base_url(api_url)?;
        }
        if let Some(db_url) = &self.overrides.db_url {
            config = config.with_db_url(db_url.clone());
        }
        Ok(config)
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

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(log_fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Prints the page a browser front end would open.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: Route) {
        let params: Vec<String> = route
            .params
            .iter()
            .chain(&route.query)
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("-> {} {}", route.name, params.join(" "));
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || matches!(argv[0].as_str(), "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv.into_iter(), std::env::var(ENV_PASSWORD).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let config = args.config()?;

    prepare_sqlite_file(config.db_url())?;
    let services =
        AppServices::connect(&config, Arc::new(TracingNotifier), Arc::new(ConsoleNavigator))
            .await?;

    match args.command {
        Command::Login { email, password } => {
            let user = services
                .auth()
                .login(&Credentials { email, password })
                .await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Me => match services.auth().check_auth().await? {
            Some(user) => println!("{} <{}> ({:?})", user.name, user.email, user.role),
            None => println!("Not signed in"),
        },
        Command::Logout => {
            services.auth().logout().await?;
            println!("Signed out");
        }
        Command::Practice {
            questions,
            category,
            shuffle,
        } => {
            let raw = std::fs::read_to_string(&questions)?;
            let questions: Vec<Question> = serde_json::from_str(&raw)?;
            practice(&services, questions, category, shuffle).await?;
        }
    }
    Ok(())
}

async fn practice(
    services: &AppServices,
    questions: Vec<Question>,
    category: Option<CategoryId>,
    shuffle: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut quiz = QuizState::new(questions);
    quiz.initialize_questions(shuffle);
    if quiz.is_empty() {
        println!("No questions to practise.");
        return Ok(());
    }

    let sync = category.map(|id| (id, services.category_sync(id)));
    let backup = services.local_backup();

    let mut timer = QuizTimer::new(0);
    timer.initialize(TimerMode::Practice);
    timer.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    'questions: loop {
        print_question(&quiz);
        loop {
            let Some(line) = lines.next_line().await? else {
                break 'questions;
            };
            let input = line.trim();
            match input {
                "q" => break 'questions,
                "f" => {
                    let flagged = quiz.toggle_flag();
                    println!("{}", if flagged { "Flagged." } else { "Unflagged." });
                    continue;
                }
                _ => {}
            }
            for choice_id in parse_selection(&quiz, input) {
                quiz.toggle_choice(choice_id);
            }
            if quiz.submit_answer(QuizMode::Practice) {
                break;
            }
            println!("Select at least one choice (e.g. `A` or `A,C`), `f` to flag, `q` to quit.");
        }

        if quiz.is_current_answer_correct() {
            println!("Correct!");
        } else {
            println!(
                "Incorrect. Correct answer: {}",
                quiz.correct_letters_display(&LETTERS)
            );
        }
        if let Some(explanation) = quiz.current_question().and_then(Question::explanation) {
            println!("{explanation}");
        }

        if let Some((id, sync)) = &sync {
            save(&quiz, &timer, *id, sync, &backup).await;
        }
        if !quiz.next_question() {
            break;
        }
    }

    timer.stop();
    let spent = timer.total_time_spent();
    println!(
        "Score: {}/{} ({}%) in {}",
        quiz.correct_count(),
        quiz.len(),
        quiz.score_percentage(),
        format_time(spent)
    );

    if let Some((id, sync)) = &sync {
        save(&quiz, &timer, *id, sync, &backup).await;
        sync.force_sync().await;
        let status = sync.status();
        if status.has_unsaved_changes() {
            println!(
                "{} progress update(s) could not be sent; a local backup was kept.",
                status.queued_items
            );
        }
    }
    Ok(())
}

async fn save(
    quiz: &QuizState,
    timer: &QuizTimer,
    category: CategoryId,
    sync: &ProgressSync,
    backup: &services::LocalBackup,
) {
    let progress = quiz.category_progress(timer.total_time_spent());
    match sync.save_progress(&progress).await {
        Ok(outcome) if outcome.is_persisted() => {}
        Ok(outcome) => {
            tracing::info!(?outcome, "progress not yet on the server");
            backup
                .save(&keys::progress_backup(category.value()), &progress)
                .await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "progress rejected");
            backup
                .save(&keys::progress_backup(category.value()), &progress)
                .await;
        }
    }
}

fn print_question(quiz: &QuizState) {
    let Some(question) = quiz.current_question() else {
        return;
    };
    println!();
    println!(
        "[{}/{}] {}",
        quiz.current_question_index() + 1,
        quiz.len(),
        question.prompt()
    );
    for (letter, choice) in LETTERS.iter().zip(quiz.shuffled_choices()) {
        println!("  {letter}. {}", choice.text);
    }
}

/// Letters such as `A,C` or `b d` mapped to the choices shown for them.
fn parse_selection(quiz: &QuizState, input: &str) -> Vec<ChoiceId> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let upper = part.to_ascii_uppercase();
            let index = LETTERS.iter().position(|letter| *letter == upper)?;
            quiz.shuffled_choices().get(index).map(|choice| choice.id)
        })
        .collect()
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

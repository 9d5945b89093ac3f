//! Command-line front end for lesson progress tracking.
//!
//! Every command prints its result as JSON on stdout. Logs go to stderr.

mod db;
mod demo_catalog;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use literacy_core::model::{LessonDefinition, LessonId, UserId};
use literacy_core::sync::{BatchSyncRequest, MentorHelpRequest, QuizScoreRequest, SaveForLaterRequest};
use services::{AppServices, Clock, ProgressServiceError};
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;

#[derive(Parser, Debug)]
#[command(name = "literacy")]
#[command(about = "Track lesson progress for digital literacy learners")]
struct Cli {
    /// SQLite database URL or path
    #[arg(long = "db", env = "LITERACY_DB_URL", default_value = "sqlite://literacy.sqlite3")]
    db_url: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LITERACY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the demo catalog, optionally creating a user too
    Seed {
        #[arg(long)]
        user: Option<u64>,
    },
    /// Load catalog lessons from a JSON array
    LoadCatalog {
        #[arg(long)]
        file: PathBuf,
    },
    /// Create an empty progress record for a user
    InitUser {
        #[arg(long)]
        user: u64,
    },
    /// Submit a batch sync payload (JSON) from a file or stdin
    Sync {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Mark or unmark a lesson to come back to later
    SaveForLater {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        clear: bool,
    },
    /// Ask for a mentor on a lesson
    MentorHelp {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record the latest quiz score (0-100)
    Quiz {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        score: u8,
    },
    /// Show a user's lesson records in a category
    Show {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        category: String,
    },
    /// Completed versus available lessons in a category
    Summary {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        category: String,
    },
    /// Recompute a user's overall counters
    Reconcile {
        #[arg(long)]
        user: u64,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_payload(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("reading payload from stdin")?;
            Ok(raw)
        }
    }
}

async fn load_catalog(repo: &SqliteRepository, lessons: &[LessonDefinition]) -> anyhow::Result<()> {
    for lesson in lessons {
        repo.upsert_lesson(lesson)
            .await
            .with_context(|| format!("storing lesson {}", lesson.id()))?;
    }
    info!(lessons = lessons.len(), "catalog loaded");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = db::normalize_sqlite_url(&cli.db_url);
    db::prepare_sqlite_file(&db_url)?;

    let repo = SqliteRepository::connect(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    repo.migrate().await.context("running migrations")?;
    let app = AppServices::from_storage(Storage::from_sqlite(repo.clone()), Clock::default_clock());
    let progress = app.progress();

    match cli.command {
        Command::Seed { user } => {
            let lessons = demo_catalog::lessons()?;
            load_catalog(&repo, &lessons).await?;
            if let Some(user) = user {
                match progress.create_user(UserId::new(user)).await {
                    Ok(_) | Err(ProgressServiceError::UserExists(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            let ids: Vec<&LessonId> = lessons.iter().map(LessonDefinition::id).collect();
            print_json(&ids)?;
        }
        Command::LoadCatalog { file } => {
            let raw = read_payload(Some(&file))?;
            let lessons: Vec<LessonDefinition> =
                serde_json::from_str(&raw).context("parsing catalog json")?;
            load_catalog(&repo, &lessons).await?;
            let ids: Vec<&LessonId> = lessons.iter().map(LessonDefinition::id).collect();
            print_json(&ids)?;
        }
        Command::InitUser { user } => {
            print_json(&progress.create_user(UserId::new(user)).await?)?;
        }
        Command::Sync { user, file } => {
            let raw = read_payload(file.as_ref())?;
            let request: BatchSyncRequest =
                serde_json::from_str(&raw).context("parsing batch sync payload")?;
            print_json(&progress.submit_batch(UserId::new(user), &request).await?)?;
        }
        Command::SaveForLater {
            user,
            category,
            lesson,
            clear,
        } => {
            let request = SaveForLaterRequest {
                category,
                lesson_id: LessonId::new(lesson),
                saved: !clear,
            };
            print_json(&progress.save_for_later(UserId::new(user), &request).await?)?;
        }
        Command::MentorHelp {
            user,
            category,
            lesson,
            notes,
        } => {
            let request = MentorHelpRequest {
                category,
                lesson_id: LessonId::new(lesson),
                notes,
            };
            print_json(&progress.request_mentor_help(UserId::new(user), &request).await?)?;
        }
        Command::Quiz {
            user,
            category,
            lesson,
            score,
        } => {
            let request = QuizScoreRequest {
                category,
                lesson_id: LessonId::new(lesson),
                score,
            };
            print_json(&progress.update_quiz_score(UserId::new(user), &request).await?)?;
        }
        Command::Show { user, category } => {
            print_json(&progress.category_progress(UserId::new(user), &category).await?)?;
        }
        Command::Summary { user, category } => {
            print_json(&progress.category_summary(UserId::new(user), &category).await?)?;
        }
        Command::Reconcile { user } => {
            print_json(&progress.reconcile(UserId::new(user)).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_with_env_defaults() {
        let cli = Cli::try_parse_from(["literacy", "--db", "sqlite::memory:", "sync", "--user", "3"])
            .unwrap();
        assert_eq!(cli.db_url, "sqlite::memory:");
        assert!(matches!(cli.command, Command::Sync { user: 3, file: None }));
    }

    #[test]
    fn quiz_score_must_fit_a_byte() {
        let parsed = Cli::try_parse_from([
            "literacy", "quiz", "--user", "1", "--category", "safety", "--lesson", "l", "--score",
            "300",
        ]);
        assert!(parsed.is_err());
    }
}

use practice_core::settings::SchedulingSettings;
use serde::Serialize;
use services::{Clock, EngineConfig, EngineServices};

mod args;

use args::{Args, ArgsError, Command, print_usage};

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(ArgsError::HelpRequested) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e.into());
        }
    };

    let settings = SchedulingSettings::default().with_recent_window(args.recent_window)?;
    let config = EngineConfig::new(settings, args.max_write_attempts)?;
    let clock = Clock::default();
    let engine = EngineServices::new_sqlite(&args.db_url, clock, &config).await?;
    tracing::debug!(db_url = %args.db_url, "engine ready");

    match args.command {
        Command::Next { learner, count } => {
            print_json(&engine.selector().get_next_questions(learner, count).await?)?;
        }
        Command::Review { learner } => {
            print_json(&engine.selector().get_questions_for_review(learner).await?)?;
        }
        Command::Scheduled { learner } => {
            print_json(&engine.selector().get_scheduled_reviews(learner).await?)?;
        }
        Command::Recommend { learner } => {
            print_json(&engine.tracker().get_topic_recommendations(learner).await?)?;
        }
        Command::Topics => {
            print_json(&engine.questions().count_by_topic().await?)?;
        }
        Command::AddQuestion(draft) => {
            let question = draft.validate(clock.now())?;
            let id = engine.questions().insert_question(question).await?;
            print_json(&id)?;
        }
        Command::Start { learner } => {
            print_json(&engine.sessions().start_session(learner).await?)?;
        }
        Command::Answer {
            session,
            question,
            is_correct,
            response_time_ms,
        } => {
            let outcome = engine
                .sessions()
                .submit_answer(session, question, is_correct, response_time_ms)
                .await?;
            print_json(&outcome)?;
        }
        Command::Complete { session } => {
            print_json(&engine.sessions().complete_session(session).await?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "command failed");
        std::process::exit(2);
    }
}

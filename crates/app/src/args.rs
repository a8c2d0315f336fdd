use std::fmt;

use practice_core::model::{Difficulty, LearnerId, QuestionDraft, QuestionId, SessionId};

#[derive(Debug)]
pub enum ArgsError {
    MissingCommand,
    UnknownCommand(String),
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidValue { flag: &'static str, raw: String },
    HelpRequested,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingCommand => write!(f, "missing command"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::HelpRequested => write!(f, "help requested"),
        }
    }
}

impl std::error::Error for ArgsError {}

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Command {
    Next { learner: LearnerId, count: usize },
    Review { learner: LearnerId },
    Scheduled { learner: LearnerId },
    Recommend { learner: LearnerId },
    Topics,
    AddQuestion(QuestionDraft),
    Start { learner: LearnerId },
    Answer {
        session: SessionId,
        question: QuestionId,
        is_correct: bool,
        response_time_ms: Option<u32>,
    },
    Complete { session: SessionId },
}

#[derive(Debug, Clone)]
pub struct Args {
    pub db_url: String,
    pub recent_window: u32,
    pub max_write_attempts: u32,
    pub command: Command,
}

#[derive(Default)]
struct Flags {
    learner: Option<LearnerId>,
    count: Option<usize>,
    topic: Option<String>,
    prompt: Option<String>,
    answer: Option<String>,
    difficulty: Option<Difficulty>,
    session: Option<SessionId>,
    question: Option<QuestionId>,
    is_correct: Option<bool>,
    response_time_ms: Option<u32>,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_value<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.parse::<T>()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

impl Args {
    /// Parse from the process environment and command line.
    pub fn parse() -> Result<Self, ArgsError> {
        Self::parse_from(std::env::args().skip(1))
    }

    /// Environment variables give defaults; flags override them.
    pub fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PRACTICE_DB_URL").unwrap_or_else(|_| "sqlite:practice.sqlite3".into());
        let mut recent_window = env_parsed::<u32>("PRACTICE_RECENT_WINDOW").unwrap_or(20);
        let mut max_write_attempts = env_parsed::<u32>("PRACTICE_MAX_WRITE_ATTEMPTS").unwrap_or(3);
        let mut flags = Flags {
            learner: env_parsed::<LearnerId>("PRACTICE_LEARNER_ID"),
            ..Flags::default()
        };

        let mut args = args.into_iter();
        let command = args.next().ok_or(ArgsError::MissingCommand)?;
        if matches!(command.as_str(), "--help" | "-h" | "help") {
            return Err(ArgsError::HelpRequested);
        }

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidValue { flag: "--db", raw: value });
                    }
                    db_url = value;
                }
                "--recent-window" => recent_window = parse_value(&mut args, "--recent-window")?,
                "--max-write-attempts" => {
                    max_write_attempts = parse_value(&mut args, "--max-write-attempts")?;
                }
                "--learner" => flags.learner = Some(parse_value(&mut args, "--learner")?),
                "--count" => flags.count = Some(parse_value(&mut args, "--count")?),
                "--topic" => flags.topic = Some(require_value(&mut args, "--topic")?),
                "--prompt" => flags.prompt = Some(require_value(&mut args, "--prompt")?),
                "--answer" => flags.answer = Some(require_value(&mut args, "--answer")?),
                "--difficulty" => {
                    flags.difficulty = Some(parse_value(&mut args, "--difficulty")?);
                }
                "--session" => flags.session = Some(parse_value(&mut args, "--session")?),
                "--question" => flags.question = Some(parse_value(&mut args, "--question")?),
                "--correct" => flags.is_correct = Some(true),
                "--incorrect" => flags.is_correct = Some(false),
                "--ms" => flags.response_time_ms = Some(parse_value(&mut args, "--ms")?),
                "--help" | "-h" => return Err(ArgsError::HelpRequested),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match command.as_str() {
            "next" => Command::Next {
                learner: required(flags.learner, "--learner")?,
                count: flags.count.unwrap_or(10),
            },
            "review" => Command::Review {
                learner: required(flags.learner, "--learner")?,
            },
            "scheduled" => Command::Scheduled {
                learner: required(flags.learner, "--learner")?,
            },
            "recommend" => Command::Recommend {
                learner: required(flags.learner, "--learner")?,
            },
            "topics" => Command::Topics,
            "add-question" => Command::AddQuestion(QuestionDraft::new(
                required(flags.topic, "--topic")?,
                required(flags.prompt, "--prompt")?,
                required(flags.answer, "--answer")?,
                flags.difficulty.unwrap_or(Difficulty::Medium),
            )),
            "start" => Command::Start {
                learner: required(flags.learner, "--learner")?,
            },
            "answer" => Command::Answer {
                session: required(flags.session, "--session")?,
                question: required(flags.question, "--question")?,
                is_correct: required(flags.is_correct, "--correct/--incorrect")?,
                response_time_ms: flags.response_time_ms,
            },
            "complete" => Command::Complete {
                session: required(flags.session, "--session")?,
            },
            _ => return Err(ArgsError::UnknownCommand(command)),
        };

        Ok(Self {
            db_url,
            recent_window,
            max_write_attempts,
            command,
        })
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  next        --learner <uuid> [--count <n>]   Ranked questions to practice next");
    eprintln!("  review      --learner <uuid>                 Questions in topics due for review");
    eprintln!("  scheduled   --learner <uuid>                 Questions whose review date has passed");
    eprintln!("  recommend   --learner <uuid>                 Topic recommendations");
    eprintln!("  topics                                       Question counts per topic");
    eprintln!("  add-question --topic <t> --prompt <p> --answer <a> [--difficulty easy|medium|hard]");
    eprintln!("  start       --learner <uuid>                 Open a practice session");
    eprintln!("  answer      --session <id> --question <id> (--correct|--incorrect) [--ms <n>]");
    eprintln!("  complete    --session <id>                   Close a practice session");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>            SQLite URL (default: sqlite:practice.sqlite3)");
    eprintln!("  --recent-window <n>          Attempts that count as recently seen (default: 20)");
    eprintln!("  --max-write-attempts <n>     Progress write attempts before giving up (default: 3)");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  PRACTICE_DB_URL, PRACTICE_RECENT_WINDOW, PRACTICE_MAX_WRITE_ATTEMPTS, PRACTICE_LEARNER_ID"
    );
    eprintln!("Logging is controlled by RUST_LOG (default: info).");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse_from(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn parses_ranked_query_with_overrides() {
        let learner = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let args = parse(&[
            "next",
            "--learner",
            learner,
            "--count",
            "5",
            "--db",
            "sqlite::memory:",
            "--recent-window",
            "8",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.recent_window, 8);
        match args.command {
            Command::Next { learner: parsed, count } => {
                assert_eq!(parsed.to_string(), learner);
                assert_eq!(count, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn answer_requires_outcome_flag() {
        let err = parse(&["answer", "--session", "1", "--question", "2"]).unwrap_err();
        assert!(matches!(err, ArgsError::MissingFlag { flag: "--correct/--incorrect" }));

        let ok = parse(&["answer", "--session", "1", "--question", "2", "--incorrect", "--ms", "900"])
            .unwrap();
        assert!(matches!(
            ok.command,
            Command::Answer { is_correct: false, response_time_ms: Some(900), .. }
        ));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&[]), Err(ArgsError::MissingCommand)));
        assert!(matches!(parse(&["teleport"]), Err(ArgsError::UnknownCommand(_))));
        assert!(matches!(
            parse(&["topics", "--count", "many"]),
            Err(ArgsError::InvalidValue { flag: "--count", .. })
        ));
        assert!(matches!(
            parse(&["topics", "--bogus"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(parse(&["topics", "--db"]), Err(ArgsError::MissingValue { .. })));
    }
}

use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            topic TEXT NOT NULL CHECK (length(topic) > 0),
            prompt TEXT NOT NULL CHECK (length(trim(prompt)) > 0),
            answer TEXT NOT NULL CHECK (length(trim(answer)) > 0),
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard')),
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            learner_id BLOB NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            total_answers INTEGER NOT NULL CHECK (total_answers >= 0),
            correct_answers INTEGER NOT NULL CHECK (correct_answers >= 0),
            incorrect_answers INTEGER NOT NULL CHECK (incorrect_answers >= 0),
            CHECK (correct_answers + incorrect_answers = total_answers)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY,
            session_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            response_time_ms INTEGER CHECK (response_time_ms IS NULL OR response_time_ms >= 0),
            attempted_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id),
            FOREIGN KEY (question_id) REFERENCES questions(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS topic_progress (
            learner_id BLOB NOT NULL,
            topic TEXT NOT NULL,
            mastery_level REAL NOT NULL CHECK (mastery_level BETWEEN 0 AND 100),
            last_practiced TEXT NOT NULL,
            total_attempts INTEGER NOT NULL CHECK (total_attempts >= 0),
            correct_attempts INTEGER NOT NULL
                CHECK (correct_attempts >= 0 AND correct_attempts <= total_attempts),
            PRIMARY KEY (learner_id, topic)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS review_states (
            learner_id BLOB NOT NULL,
            question_id INTEGER NOT NULL,
            ease_factor REAL NOT NULL CHECK (ease_factor >= 1.3),
            interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
            repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
            review_count INTEGER NOT NULL CHECK (review_count >= 0),
            last_reviewed_at TEXT NOT NULL,
            next_review_at TEXT NOT NULL,
            PRIMARY KEY (learner_id, question_id),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_topic
            ON questions(topic, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_learner
            ON sessions(learner_id, started_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_session_attempted_at
            ON attempts(session_id, attempted_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_question
            ON attempts(question_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_states_learner_due
            ON review_states(learner_id, next_review_at);
    ",
];

/// Apply every pending schema version inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        tracing::debug!(version = 1, "schema already applied");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in SCHEMA_V1 {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(version = 1, "applied schema migration");
    Ok(())
}

use practice_core::model::{Difficulty, NewQuestion, Question, QuestionId, Topic};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_question_row, question_id_from_i64, ser, store_err};
use crate::repository::{QuestionRepository, StorageError, TopicCount};

const SELECT_QUESTION: &str =
    "SELECT id, topic, prompt, answer, difficulty, created_at FROM questions";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn list_questions(&self) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_QUESTION} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(map_question_row).collect()
    }

    async fn questions_by_topic(&self, topic: &Topic) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_QUESTION} WHERE topic = ?1 ORDER BY id ASC"))
            .bind(topic.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(map_question_row).collect()
    }

    async fn questions_by_difficulty(
        &self,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_QUESTION} WHERE difficulty = ?1 ORDER BY id ASC"
        ))
        .bind(difficulty.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(map_question_row).collect()
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let row = sqlx::query(&format!("{SELECT_QUESTION} WHERE id = ?1"))
            .bind(id_to_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(map_question_row).transpose()
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<QuestionId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO questions (topic, prompt, answer, difficulty, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(question.topic.as_str())
        .bind(question.prompt)
        .bind(question.answer)
        .bind(question.difficulty.as_str())
        .bind(question.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        question_id_from_i64(res.last_insert_rowid())
    }

    async fn update_question(&self, question: &Question) -> Result<(), StorageError> {
        question
            .validate()
            .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;
        let res = sqlx::query(
            r"
            UPDATE questions
            SET topic = ?1, prompt = ?2, answer = ?3, difficulty = ?4
            WHERE id = ?5
            ",
        )
        .bind(question.topic.as_str())
        .bind(&question.prompt)
        .bind(&question.answer)
        .bind(question.difficulty.as_str())
        .bind(id_to_i64("question_id", question.id.value())?)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM questions WHERE id = ?1")
            .bind(id_to_i64("question_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn count_by_topic(&self) -> Result<Vec<TopicCount>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT topic, COUNT(*) AS questions
            FROM questions
            GROUP BY topic
            ORDER BY topic ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let topic = Topic::new(row.try_get::<String, _>("topic").map_err(ser)?)
                    .map_err(ser)?;
                let count: i64 = row.try_get("questions").map_err(ser)?;
                Ok(TopicCount {
                    topic,
                    questions: u32::try_from(count).map_err(ser)?,
                })
            })
            .collect()
    }
}

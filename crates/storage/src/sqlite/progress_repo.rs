use practice_core::model::{LearnerId, Topic, TopicProgress};

use super::SqliteRepository;
use super::mapping::{map_progress_row, store_err};
use crate::repository::{StorageError, TopicProgressRepository};

#[async_trait::async_trait]
impl TopicProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        topic: &Topic,
    ) -> Result<Option<TopicProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, topic, mastery_level, last_practiced, total_attempts, correct_attempts
            FROM topic_progress
            WHERE learner_id = ?1 AND topic = ?2
            ",
        )
        .bind(learner_id.as_uuid())
        .bind(topic.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn progress_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<TopicProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, topic, mastery_level, last_practiced, total_attempts, correct_attempts
            FROM topic_progress
            WHERE learner_id = ?1
            ORDER BY topic ASC
            ",
        )
        .bind(learner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn insert_progress(&self, progress: &TopicProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO topic_progress
                (learner_id, topic, mastery_level, last_practiced, total_attempts, correct_attempts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(progress.learner_id().as_uuid())
        .bind(progress.topic().as_str())
        .bind(progress.mastery_level())
        .bind(progress.last_practiced())
        .bind(i64::from(progress.total_attempts()))
        .bind(i64::from(progress.correct_attempts()))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn update_progress(
        &self,
        progress: &TopicProgress,
        expected_total_attempts: u32,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE topic_progress
            SET mastery_level = ?1,
                last_practiced = ?2,
                total_attempts = ?3,
                correct_attempts = ?4
            WHERE learner_id = ?5 AND topic = ?6 AND total_attempts = ?7
            ",
        )
        .bind(progress.mastery_level())
        .bind(progress.last_practiced())
        .bind(i64::from(progress.total_attempts()))
        .bind(i64::from(progress.correct_attempts()))
        .bind(progress.learner_id().as_uuid())
        .bind(progress.topic().as_str())
        .bind(i64::from(expected_total_attempts))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if res.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: either the row is gone or another writer got there first.
        let exists = sqlx::query("SELECT 1 FROM topic_progress WHERE learner_id = ?1 AND topic = ?2")
            .bind(progress.learner_id().as_uuid())
            .bind(progress.topic().as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }
}

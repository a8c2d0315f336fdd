use chrono::Duration;
use practice_core::model::{
    Difficulty, LearnerId, NewAttempt, NewQuestion, ProgressUpdate, QuestionDraft, QuestionId,
    ReviewState, Topic, TopicProgress,
};
use practice_core::time::fixed_now;
use storage::repository::{
    AnswerRepository, AnswerWrite, AttemptRepository, QuestionRepository, ReviewStateRepository,
    SessionRepository, Storage, StorageError, TopicCount, TopicProgressRepository,
};
use storage::sqlite::SqliteRepository;

async fn open(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn draft(topic: &str, prompt: &str, difficulty: Difficulty) -> NewQuestion {
    QuestionDraft::new(topic, prompt, "answer", difficulty)
        .validate(fixed_now())
        .unwrap()
}

#[tokio::test]
async fn sqlite_question_bank_roundtrip() {
    let repo = open("memdb_questions").await;

    let first = repo
        .insert_question(draft("Ownership", "What is a move?", Difficulty::Medium))
        .await
        .unwrap();
    repo.insert_question(draft("Ownership", "What is a borrow?", Difficulty::Easy))
        .await
        .unwrap();
    repo.insert_question(draft("Traits", "What is dyn?", Difficulty::Hard))
        .await
        .unwrap();

    let fetched = repo.get_question(first).await.unwrap().expect("present");
    assert_eq!(fetched.prompt, "What is a move?");
    assert_eq!(fetched.difficulty, Difficulty::Medium);
    assert_eq!(fetched.created_at, fixed_now());

    let ownership = Topic::new("Ownership").unwrap();
    assert_eq!(repo.questions_by_topic(&ownership).await.unwrap().len(), 2);
    assert_eq!(
        repo.questions_by_difficulty(Difficulty::Hard).await.unwrap().len(),
        1
    );
    assert_eq!(
        repo.count_by_topic().await.unwrap(),
        vec![
            TopicCount { topic: ownership, questions: 2 },
            TopicCount { topic: Topic::new("Traits").unwrap(), questions: 1 },
        ]
    );

    let mut edited = fetched.clone();
    edited.difficulty = Difficulty::Hard;
    repo.update_question(&edited).await.unwrap();
    assert_eq!(
        repo.get_question(first).await.unwrap().unwrap().difficulty,
        Difficulty::Hard
    );

    let mut blanked = edited.clone();
    blanked.answer = " ".into();
    assert!(matches!(
        repo.update_question(&blanked).await,
        Err(StorageError::ConstraintViolation(_))
    ));

    assert!(repo.get_question(QuestionId::new(999)).await.unwrap().is_none());
    assert!(matches!(
        repo.delete_question(QuestionId::new(999)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_attempts_join_topics_and_enforce_references() {
    let repo = open("memdb_attempts").await;
    let learner = LearnerId::random();
    let now = fixed_now();

    let q1 = repo
        .insert_question(draft("Ownership", "q1", Difficulty::Easy))
        .await
        .unwrap();
    let q2 = repo
        .insert_question(draft("Traits", "q2", Difficulty::Easy))
        .await
        .unwrap();
    let session = repo.create_session(learner, now).await.unwrap();

    repo.append_attempt(NewAttempt::new(session.id(), q1, true, Some(4_000), now))
        .await
        .unwrap();
    repo.append_attempt(NewAttempt::new(
        session.id(),
        q2,
        false,
        None,
        now + Duration::minutes(1),
    ))
    .await
    .unwrap();

    let in_session = repo.attempts_for_session(session.id()).await.unwrap();
    assert_eq!(in_session.len(), 2);
    assert_eq!(in_session[0].question_id, q1);
    assert_eq!(in_session[0].response_time_ms, Some(4_000));
    assert!(in_session[0].is_correct);

    let recent = repo.recent_attempts(learner, 20).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].question_id, q2);
    assert_eq!(recent[0].topic.as_str(), "Traits");
    assert!(!recent[0].is_correct);

    assert!(repo.recent_attempts(LearnerId::random(), 20).await.unwrap().is_empty());

    let orphan = NewAttempt::new(session.id(), QuestionId::new(404), true, None, now);
    assert!(matches!(
        repo.append_attempt(orphan).await,
        Err(StorageError::ConstraintViolation(_))
    ));
    assert!(matches!(
        repo.delete_question(q1).await,
        Err(StorageError::ConstraintViolation(_))
    ));
}

#[tokio::test]
async fn sqlite_progress_uses_compare_and_swap() {
    let repo = open("memdb_progress").await;
    let learner = LearnerId::random();
    let topic = Topic::new("Ownership").unwrap();
    let now = fixed_now();

    assert!(repo.get_progress(learner, &topic).await.unwrap().is_none());

    let mut progress = TopicProgress::untouched(learner, topic.clone(), now);
    progress.apply(ProgressUpdate::Answered { is_correct: true }, now);
    repo.insert_progress(&progress).await.unwrap();
    assert!(matches!(
        repo.insert_progress(&progress).await,
        Err(StorageError::ConstraintViolation(_))
    ));

    let mut next = progress.clone();
    next.apply(ProgressUpdate::Answered { is_correct: false }, now + Duration::hours(1));
    assert!(matches!(
        repo.update_progress(&next, 5).await,
        Err(StorageError::Conflict)
    ));
    repo.update_progress(&next, 1).await.unwrap();

    let stored = repo.get_progress(learner, &topic).await.unwrap().unwrap();
    assert_eq!(stored.total_attempts(), 2);
    assert_eq!(stored.correct_attempts(), 1);
    assert_eq!(stored.last_practiced(), now + Duration::hours(1));
    assert!((stored.mastery_level() - 50.0).abs() < 1e-9);

    let all = repo.progress_for_learner(learner).await.unwrap();
    assert_eq!(all.len(), 1);

    let missing = TopicProgress::untouched(learner, Topic::new("Traits").unwrap(), now);
    assert!(matches!(
        repo.update_progress(&missing, 0).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_sessions_persist_counters_and_completion() {
    let repo = open("memdb_sessions").await;
    let learner = LearnerId::random();
    let now = fixed_now();

    let mut session = repo.create_session(learner, now).await.unwrap();
    session.record_answer(true).unwrap();
    session.record_answer(false).unwrap();
    session.complete(now + Duration::minutes(10)).unwrap();

    assert!(matches!(
        repo.update_session(&session, 1).await,
        Err(StorageError::Conflict)
    ));
    repo.update_session(&session, 0).await.unwrap();

    let stored = repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored, session);
    assert_eq!(stored.total_answers(), 2);
    assert!(stored.is_completed());

    // A closed session takes no further writes.
    assert!(matches!(
        repo.update_session(&session, 2).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn sqlite_answer_commit_is_all_or_nothing() {
    let repo = open("memdb_answers").await;
    let learner = LearnerId::random();
    let now = fixed_now();
    let topic = Topic::new("Ownership").unwrap();

    let q = repo
        .insert_question(draft("Ownership", "q", Difficulty::Easy))
        .await
        .unwrap();
    let session = repo.create_session(learner, now).await.unwrap();

    let write = |progress: Option<&TopicProgress>| {
        let mut next_session = session.clone();
        next_session.record_answer(true).unwrap();
        let mut next_progress = progress
            .cloned()
            .unwrap_or_else(|| TopicProgress::untouched(learner, topic.clone(), now));
        next_progress.apply(ProgressUpdate::Answered { is_correct: true }, now);
        let mut review = ReviewState::unseen(learner, q, now);
        review.apply_review(1.0, now);
        AnswerWrite {
            attempt: NewAttempt::new(session.id(), q, true, Some(2_000), now),
            expected_session_answers: 0,
            session: next_session,
            expected_progress_attempts: progress.map(TopicProgress::total_attempts),
            progress: next_progress,
            expected_review_count: None,
            review,
        }
    };

    // The progress row appeared after it was read as missing: the session
    // update and attempt insert that already ran must be rolled back.
    let mut existing = TopicProgress::untouched(learner, topic.clone(), now);
    existing.apply(ProgressUpdate::Answered { is_correct: false }, now);
    repo.insert_progress(&existing).await.unwrap();

    assert!(matches!(
        repo.commit_answer(&write(None)).await,
        Err(StorageError::Conflict)
    ));
    assert!(repo.attempts_for_session(session.id()).await.unwrap().is_empty());
    assert_eq!(repo.get_session(session.id()).await.unwrap().unwrap().total_answers(), 0);
    assert_eq!(
        repo.get_progress(learner, &topic).await.unwrap().unwrap().total_attempts(),
        1
    );
    assert!(repo.get_review_state(learner, q).await.unwrap().is_none());

    let attempt_id = repo.commit_answer(&write(Some(&existing))).await.unwrap();
    let attempts = repo.attempts_for_session(session.id()).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, attempt_id);
    assert_eq!(repo.get_session(session.id()).await.unwrap().unwrap().total_answers(), 1);
    assert_eq!(
        repo.get_progress(learner, &topic).await.unwrap().unwrap().total_attempts(),
        2
    );
    let review = repo.get_review_state(learner, q).await.unwrap().unwrap();
    assert_eq!(review.review_count(), 1);
    assert_eq!(review.interval_days(), 1);

    // Replaying the same write finds the session already moved on.
    assert!(matches!(
        repo.commit_answer(&write(Some(&existing))).await,
        Err(StorageError::Conflict)
    ));
    assert_eq!(repo.attempts_for_session(session.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_review_states_upsert_and_report_due() {
    let repo = open("memdb_review_states").await;
    let learner = LearnerId::random();
    let now = fixed_now();

    let q1 = repo
        .insert_question(draft("Ownership", "q1", Difficulty::Easy))
        .await
        .unwrap();
    let q2 = repo
        .insert_question(draft("Ownership", "q2", Difficulty::Easy))
        .await
        .unwrap();

    let mut state = ReviewState::unseen(learner, q1, now - Duration::days(10));
    state.apply_review(1.0, now - Duration::days(10));
    repo.upsert_review_state(&state).await.unwrap();

    let mut later = ReviewState::unseen(learner, q2, now);
    later.apply_review(1.0, now);
    repo.upsert_review_state(&later).await.unwrap();

    let due = repo.due_review_states(learner, now).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].question_id(), q1);
    assert_eq!(due[0].interval_days(), 1);

    state.apply_review(1.0, now);
    repo.upsert_review_state(&state).await.unwrap();
    let stored = repo.get_review_state(learner, q1).await.unwrap().unwrap();
    assert_eq!(stored.repetitions(), 2);
    assert_eq!(stored.interval_days(), 6);
    assert!(repo.due_review_states(learner, now).await.unwrap().is_empty());

    repo.delete_question(q2).await.unwrap();
    assert!(repo.get_review_state(learner, q2).await.unwrap().is_none());
}

#[tokio::test]
async fn storage_sqlite_wires_every_repository() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    let id = storage
        .questions
        .insert_question(draft("Ownership", "q", Difficulty::Easy))
        .await
        .unwrap();
    assert!(storage.questions.get_question(id).await.unwrap().is_some());
    assert!(
        storage
            .progress
            .progress_for_learner(LearnerId::random())
            .await
            .unwrap()
            .is_empty()
    );
}

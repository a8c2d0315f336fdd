use chrono::Duration;
use practice_core::model::{LearnerId, Topic, TopicProgress};
use practice_core::time::fixed_now;
use proptest::prelude::*;
use services::{Clock, ProgressTracker};
use std::sync::Arc;
use storage::repository::{InMemoryRepository, TopicProgressRepository};

#[derive(Debug, Clone, Copy)]
enum Event {
    Answered(bool),
    Graded(f64),
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        any::<bool>().prop_map(Event::Answered),
        prop_oneof![
            -1.0f64..2.0,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ]
        .prop_map(Event::Graded),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn counters_and_mastery_stay_consistent(events in prop::collection::vec(event(), 1..40)) {
        let rt = runtime();
        let (stored, expected_correct) = rt.block_on(async {
            let repo = InMemoryRepository::new();
            let learner = LearnerId::random();
            let topic = Topic::new("Ownership").unwrap();
            let mut clock = Clock::fixed(fixed_now());
            let mut expected_correct = 0_u32;

            for event in &events {
                let tracker = ProgressTracker::new(
                    clock,
                    Arc::new(repo.clone()),
                    Arc::new(repo.clone()),
                );
                let progress = match *event {
                    Event::Answered(is_correct) => {
                        if is_correct {
                            expected_correct += 1;
                        }
                        tracker
                            .record_attempt_and_update_progress(learner, &topic, is_correct)
                            .await
                    }
                    Event::Graded(performance) => {
                        if performance > 0.5 {
                            expected_correct += 1;
                        }
                        tracker.record_graded_attempt(learner, &topic, performance).await
                    }
                }
                .unwrap();
                assert!(progress.correct_attempts() <= progress.total_attempts());
                assert!((0.0..=100.0).contains(&progress.mastery_level()));
                clock.advance(Duration::hours(6));
            }

            let stored = repo.get_progress(learner, &topic).await.unwrap().unwrap();
            (stored, expected_correct)
        });

        prop_assert_eq!(stored.total_attempts() as usize, events.len());
        prop_assert_eq!(stored.correct_attempts(), expected_correct);
        prop_assert!(stored.correct_attempts() <= stored.total_attempts());
        prop_assert!((0.0..=100.0).contains(&stored.mastery_level()));
        prop_assert_eq!(stored.last_practiced(), fixed_now() + Duration::hours(6 * (events.len() as i64 - 1)));
    }

    #[test]
    fn persisted_counters_are_validated(total in 0u32..1_000, correct in 0u32..1_000, mastery in 0.0f64..=100.0) {
        let restored = TopicProgress::from_persisted(
            LearnerId::random(),
            Topic::new("Ownership").unwrap(),
            mastery,
            fixed_now(),
            total,
            correct,
        );
        if correct <= total {
            let progress = restored.unwrap();
            if progress.total_attempts() == 0 {
                prop_assert_eq!(progress.correct_attempts(), 0);
                prop_assert_eq!(progress.success_rate(), None);
            }
        } else {
            prop_assert!(restored.is_err());
        }
    }
}

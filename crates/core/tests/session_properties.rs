//! Property-based tests for the session state machine and scorer.

use exam_core::model::{
    Difficulty, Question, QuestionDraft, QuestionId, QuestionKind, QuestionSetId, SessionError,
    SessionMode, SessionState, TickOutcome, score,
};
use proptest::prelude::*;

fn build_questions(correct: &[usize]) -> Vec<Question> {
    correct
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            QuestionDraft {
                id: QuestionId::new(i as u64),
                set_id: QuestionSetId::new(1),
                prompt: format!("Q{i}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option: c,
                explanation: None,
                difficulty: Difficulty::Medium,
                kind: QuestionKind::Vocabulary,
                passage: None,
            }
            .validate()
            .unwrap()
        })
        .collect()
}

fn arb_mode() -> impl Strategy<Value = SessionMode> {
    prop_oneof![Just(SessionMode::Practice), Just(SessionMode::Exam)]
}

fn arb_correct() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..4, 1..25)
}

/// A user action against a session: (question, option) answer, flag, navigate.
#[derive(Debug, Clone)]
enum Action {
    Answer(usize, usize),
    Flag(usize),
    Navigate(usize),
    Elapse(u32),
}

fn arb_actions() -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(
        prop_oneof![
            (0usize..30, 0usize..5).prop_map(|(q, o)| Action::Answer(q, o)),
            (0usize..30).prop_map(Action::Flag),
            (0usize..30).prop_map(Action::Navigate),
            (0u32..20).prop_map(Action::Elapse),
        ],
        0..60,
    )
}

fn apply(state: &mut SessionState, action: &Action) {
    let _ = match *action {
        Action::Answer(q, o) => state.select_answer(q, o),
        Action::Flag(q) => state.toggle_flag(q).map(|_| ()),
        Action::Navigate(q) => state.navigate_to(q),
        Action::Elapse(s) => state.elapse(s).map(|_| ()),
    };
}

proptest! {
    #[test]
    fn initialize_starts_clean(
        correct in arb_correct(),
        mode in arb_mode(),
        duration in 1u32..10_000,
    ) {
        let s = SessionState::initialize(build_questions(&correct), mode, duration).unwrap();
        prop_assert_eq!(s.current_index(), 0);
        prop_assert_eq!(s.remaining_seconds(), duration);
        prop_assert!(s.answers().iter().all(Option::is_none));
        prop_assert!(s.flags().iter().all(|f| !f));
        prop_assert_eq!(s.answers().len(), correct.len());
        prop_assert!(s.is_timer_active());
    }

    #[test]
    fn ticks_never_go_negative_and_expire_once(
        duration in 1u32..50,
        steps in prop::collection::vec(0u32..7, 0..80),
    ) {
        let mut s = SessionState::initialize(build_questions(&[0]), SessionMode::Exam, duration)
            .unwrap();
        let mut last = s.remaining_seconds();
        let mut expirations = 0;
        for step in steps {
            match s.elapse(step) {
                Ok(TickOutcome::Expired) => expirations += 1,
                Ok(TickOutcome::Running { remaining_seconds }) => {
                    prop_assert!(remaining_seconds > 0);
                }
                Err(e) => prop_assert_eq!(e, SessionError::SessionTerminated),
            }
            prop_assert!(s.remaining_seconds() <= last);
            last = s.remaining_seconds();
        }
        prop_assert!(expirations <= 1);
        prop_assert_eq!(expirations == 1, s.remaining_seconds() == 0);
    }

    #[test]
    fn scoring_counts_cover_every_question(
        correct in arb_correct(),
        mode in arb_mode(),
        actions in arb_actions(),
    ) {
        let mut s = SessionState::initialize(build_questions(&correct), mode, 200).unwrap();
        for action in &actions {
            apply(&mut s, action);
        }
        s.submit();
        let r = score(&s).unwrap();
        prop_assert_eq!(
            r.correct_count() + r.incorrect_count() + r.unanswered_count(),
            correct.len() as u32
        );
        prop_assert!(r.score_percent() <= 100);
    }

    #[test]
    fn second_submit_changes_nothing(
        correct in arb_correct(),
        mode in arb_mode(),
        actions in arb_actions(),
    ) {
        let mut s = SessionState::initialize(build_questions(&correct), mode, 200).unwrap();
        for action in &actions {
            apply(&mut s, action);
        }
        s.submit();
        let before = score(&s).unwrap();
        prop_assert!(!s.submit());
        prop_assert_eq!(score(&s).unwrap(), before);
    }

    #[test]
    fn exam_index_never_moves_back(actions in arb_actions()) {
        let mut s = SessionState::initialize(build_questions(&[0; 30]), SessionMode::Exam, 500)
            .unwrap();
        let mut last = s.current_index();
        for action in &actions {
            apply(&mut s, action);
            prop_assert!(s.current_index() >= last);
            last = s.current_index();
        }
    }
}

#[test]
fn spec_scenario_exam_back_navigation() {
    let mut s = SessionState::initialize(build_questions(&[0, 1, 2]), SessionMode::Exam, 60)
        .unwrap();
    s.navigate_to(1).unwrap();
    s.navigate_to(2).unwrap();
    assert!(matches!(
        s.navigate_to(0),
        Err(SessionError::BackwardNavigationForbidden { current: 2, requested: 0 })
    ));
}

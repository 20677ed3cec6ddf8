use exam_core::model::{
    Difficulty, Question, QuestionDraft, QuestionId, QuestionKind, QuestionSetId, SessionMode,
    SessionSnapshot, SessionState, TerminationReason, score,
};
use exam_core::time::fixed_now;
use storage::repository::{
    QuestionCatalog, QuestionSelector, QuestionSupply, ResultRepository, SnapshotRepository,
    StorageError,
};
use storage::sqlite::SqliteRepository;

fn build_question(id: u64, set: u64, difficulty: Difficulty) -> Question {
    QuestionDraft {
        id: QuestionId::new(id),
        set_id: QuestionSetId::new(set),
        prompt: format!("Choose the closest restatement #{id}"),
        options: vec!["first".into(), "second".into(), "third".into(), "fourth".into()],
        correct_option: (id % 4) as usize,
        explanation: Some("The second clause is a paraphrase.".into()),
        difficulty,
        kind: QuestionKind::Restatement,
        passage: (id % 2 == 0).then(|| "passages/ocean.png".to_string()),
    }
    .validate()
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_questions_round_trip_in_position_order() {
    let repo = connect("memdb_questions").await;

    repo.upsert_question(&build_question(3, 1, Difficulty::Hard), 0)
        .await
        .unwrap();
    repo.upsert_question(&build_question(1, 1, Difficulty::Easy), 1)
        .await
        .unwrap();
    repo.upsert_question(&build_question(2, 1, Difficulty::Easy), 2)
        .await
        .unwrap();
    repo.upsert_question(&build_question(4, 2, Difficulty::Easy), 0)
        .await
        .unwrap();

    let selector = QuestionSelector::for_set(QuestionSetId::new(1));
    let fetched = repo.fetch(&selector).await.unwrap();
    let ids: Vec<u64> = fetched.iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert_eq!(fetched[0], build_question(3, 1, Difficulty::Hard));

    let easy = repo
        .fetch(&selector.clone().with_difficulty(Difficulty::Easy).with_limit(1))
        .await
        .unwrap();
    assert_eq!(easy.len(), 1);
    assert_eq!(easy[0].id(), QuestionId::new(1));

    // re-import moves a question
    repo.upsert_question(&build_question(3, 1, Difficulty::Hard), 9)
        .await
        .unwrap();
    let ids: Vec<u64> = repo
        .fetch(&selector)
        .await
        .unwrap()
        .iter()
        .map(|q| q.id().value())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(repo.count_questions(QuestionSetId::new(1)).await.unwrap(), 3);
}

#[tokio::test]
async fn sqlite_snapshots_resume_and_ignore_stale_writes() {
    let repo = connect("memdb_snapshots").await;

    let questions = vec![
        build_question(1, 1, Difficulty::Easy),
        build_question(2, 1, Difficulty::Medium),
    ];
    let mut state = SessionState::initialize(questions, SessionMode::Exam, 600).unwrap();
    let first = SessionSnapshot::capture(&state, fixed_now());
    state.select_answer(0, 3).unwrap();
    state.toggle_flag(1).unwrap();
    state.elapse(42).unwrap();
    let latest = SessionSnapshot::capture(&state, fixed_now());

    repo.save(&latest).await.unwrap();
    repo.save(&first).await.unwrap();

    let loaded = repo.load(state.id()).await.unwrap().expect("snapshot");
    assert_eq!(loaded, latest);
    assert_eq!(loaded.restore().unwrap(), state);

    repo.delete(state.id()).await.unwrap();
    assert!(repo.load(state.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_results_history() {
    let repo = connect("memdb_results").await;

    let mut state = SessionState::initialize(
        vec![
            build_question(1, 1, Difficulty::Easy),
            build_question(2, 1, Difficulty::Easy),
        ],
        SessionMode::Practice,
        60,
    )
    .unwrap();
    state.select_answer(0, 1).unwrap();
    state.elapse(60).unwrap();
    let result = score(&state).unwrap();

    let older = repo.append_result(&result.summary(fixed_now())).await.unwrap();
    let newer = repo
        .append_result(&result.summary(fixed_now() + chrono::Duration::hours(1)))
        .await
        .unwrap();

    let stored = repo.get_result(older).await.unwrap();
    assert_eq!(stored, result.summary(fixed_now()));
    assert_eq!(stored.reason(), TerminationReason::TimedOut);
    assert_eq!(stored.correct(), 1);
    assert_eq!(stored.score_percent(), 50);

    let rows = repo.list_results(10).await.unwrap();
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer, older]);

    assert!(matches!(
        repo.get_result(older + 100).await.unwrap_err(),
        StorageError::NotFound
    ));
}

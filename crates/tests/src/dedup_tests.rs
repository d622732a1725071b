use livepoll_db::models::QuestionType;
use livepoll_services::bus::{BusMessage, topics};
use livepoll_services::pipeline::{MessageOutcome, PipelineError, SubmitMeta, VoteRequest};

use crate::fixtures::harness::Harness;
use crate::fixtures::seed::{COLORS, active_session, vote_event};

#[tokio::test]
async fn concurrent_identical_votes_store_exactly_one() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Race", &COLORS, QuestionType::Single).await;
    let first = vote_event(&session, "alice", &[0]);
    let second = vote_event(&session, "alice", &[1]);

    let processor = &harness.services.processor;
    let (a, b) = tokio::join!(processor.process(&first), processor.process(&second));

    let outcomes = [a, b];
    let accepted = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(PipelineError::Conflict)))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(harness.store.vote_count(), 1);
}

#[tokio::test]
async fn resubmitted_vote_is_rejected_downstream() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Twice", &COLORS, QuestionType::Single).await;
    let mut sub = harness
        .services
        .bus
        .subscribe(topics::VOTES_SUBMITTED, "dedup-test")
        .await
        .unwrap();

    let request = VoteRequest {
        session_id: session.id.to_hex(),
        question_id: session.questions[0].id.to_hex(),
        participant_id: "bob".to_string(),
        selected_options: vec![1],
    };
    // Both submissions are acknowledged: ingestion never checks for duplicates.
    let first = harness
        .services
        .ingestion
        .submit(request.clone(), SubmitMeta::default())
        .await
        .unwrap();
    let second = harness
        .services
        .ingestion
        .submit(request, SubmitMeta::default())
        .await
        .unwrap();
    assert_ne!(first.vote_id, second.vote_id);

    let mut messages: Vec<BusMessage> = Vec::new();
    while messages.len() < 2 {
        let next = sub.next(std::time::Duration::from_secs(1)).await.unwrap();
        messages.push(next.expect("vote event should be on the bus"));
    }

    let processor = &harness.services.processor;
    assert!(matches!(
        processor.handle_message(&messages[0]).await,
        MessageOutcome::Processed(_)
    ));
    assert!(matches!(
        processor.handle_message(&messages[1]).await,
        MessageOutcome::Rejected(PipelineError::Conflict)
    ));
    assert_eq!(harness.store.vote_count(), 1);
}

#[tokio::test]
async fn unique_index_holds_when_the_cache_forgets() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Amnesia", &COLORS, QuestionType::Single).await;

    harness
        .services
        .processor
        .process(&vote_event(&session, "carol", &[2]))
        .await
        .unwrap();

    harness.cache.clear();

    let again = harness
        .services
        .processor
        .process(&vote_event(&session, "carol", &[0]))
        .await;
    assert!(matches!(again, Err(PipelineError::Conflict)));
    assert_eq!(harness.store.vote_count(), 1);

    let results = harness
        .services
        .aggregator
        .results(&session.id, &session.questions[0].id)
        .await
        .unwrap();
    assert_eq!(results.total_votes, 1);
    assert_eq!(results.options[2].count, 1);
}

#[tokio::test]
async fn same_participant_may_vote_on_each_question_once() {
    let harness = Harness::new();
    let first = active_session(&harness.services.sessions, "First", &COLORS, QuestionType::Single).await;
    let second = active_session(&harness.services.sessions, "Second", &COLORS, QuestionType::Single).await;

    let processor = &harness.services.processor;
    processor.process(&vote_event(&first, "dave", &[0])).await.unwrap();
    processor.process(&vote_event(&second, "dave", &[0])).await.unwrap();
    processor.process(&vote_event(&first, "erin", &[0])).await.unwrap();

    assert_eq!(harness.store.vote_count(), 3);
}

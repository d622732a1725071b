use std::collections::BTreeMap;

use bson::oid::ObjectId;
use livepoll_db::models::{Question, QuestionResult, QuestionType, VoteTally};

use crate::fixtures::harness::Harness;
use crate::fixtures::seed::{COLORS, active_session, vote_event};

const EPSILON: f64 = 0.01;

fn assert_percentages_consistent(result: &QuestionResult) {
    let sum: u64 = result.options.iter().map(|o| o.count).sum();
    assert_eq!(sum, result.total_votes);
    for option in &result.options {
        let expected = if result.total_votes == 0 {
            0.0
        } else {
            100.0 * option.count as f64 / result.total_votes as f64
        };
        assert!((option.percentage - expected).abs() < 1e-9);
    }
}

#[tokio::test]
async fn favorite_color_scenario() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Favorite color", &COLORS, QuestionType::Single).await;
    let processor = &harness.services.processor;

    for (participant, option) in [("p1", 0), ("p2", 0), ("p3", 1)] {
        processor
            .process(&vote_event(&session, participant, &[option]))
            .await
            .unwrap();
    }

    let result = harness
        .services
        .aggregator
        .results(&session.id, &session.questions[0].id)
        .await
        .unwrap();

    assert_eq!(result.total_votes, 3);
    assert_eq!(result.voters_count, 3);
    let texts: Vec<&str> = result.options.iter().map(|o| o.text.as_str()).collect();
    assert_eq!(texts, COLORS.to_vec());
    assert_eq!(result.options[0].count, 2);
    assert!((result.options[0].percentage - 66.67).abs() < EPSILON);
    assert_eq!(result.options[1].count, 1);
    assert!((result.options[1].percentage - 33.33).abs() < EPSILON);
    assert_eq!(result.options[2].count, 0);
    assert_eq!(result.options[2].percentage, 0.0);
    assert_percentages_consistent(&result);
}

#[tokio::test]
async fn question_without_votes_has_zero_percentages() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Empty", &COLORS, QuestionType::Single).await;

    let results = harness.services.aggregator.session_results(&session.id).await.unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.total_votes, 0);
    assert_eq!(result.voters_count, 0);
    assert!(result.options.iter().all(|o| o.count == 0 && o.percentage == 0.0));
    assert_percentages_consistent(result);
}

#[tokio::test]
async fn multi_select_counts_every_selected_option() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Approval", &COLORS, QuestionType::Multiple).await;
    let processor = &harness.services.processor;

    processor.process(&vote_event(&session, "a", &[0, 1])).await.unwrap();
    processor.process(&vote_event(&session, "b", &[0, 1, 2])).await.unwrap();

    let result = harness
        .services
        .aggregator
        .results(&session.id, &session.questions[0].id)
        .await
        .unwrap();
    assert_eq!(result.voters_count, 2);
    assert_eq!(result.total_votes, 5);
    assert!(result.total_votes > result.voters_count);
    assert_eq!(result.options[0].count, 2);
    assert_eq!(result.options[2].count, 1);
    assert!((result.options[2].percentage - 20.0).abs() < 1e-9);
    assert_percentages_consistent(&result);
}

#[tokio::test]
async fn totals_never_decrease_as_votes_arrive() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Growth", &COLORS, QuestionType::Single).await;
    let question_id = session.questions[0].id;

    let mut last = 0;
    for i in 0..6 {
        harness
            .services
            .processor
            .process(&vote_event(&session, &format!("p{i}"), &[i % 3]))
            .await
            .unwrap();
        // Every accepted vote refreshes the cached snapshot.
        let result = harness
            .services
            .cache
            .cached_results(&session.id, &question_id)
            .await
            .expect("snapshot should be cached after a vote");
        assert!(result.total_votes >= last);
        assert_eq!(result.total_votes, i as u64 + 1);
        last = result.total_votes;
        assert_percentages_consistent(&result);
    }
}

#[tokio::test]
async fn unknown_question_results_are_not_found() {
    let harness = Harness::new();
    let session = active_session(&harness.services.sessions, "Lookup", &COLORS, QuestionType::Single).await;

    let err = harness
        .services
        .aggregator
        .results(&session.id, &ObjectId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, livepoll_services::pipeline::PipelineError::NotFound(_)));
}

#[test]
fn out_of_range_counts_are_ignored() {
    let question = Question {
        id: ObjectId::new(),
        text: "Pick".to_string(),
        options: vec!["A".to_string(), "B".to_string()],
        question_type: QuestionType::Single,
    };
    let tally = VoteTally {
        counts: BTreeMap::from([(0, 3), (1, 1), (5, 4), (-1, 2)]),
        unique_voters: 4,
    };

    let result = QuestionResult::from_tally(&question, &tally);
    assert_eq!(result.total_votes, 4);
    assert_eq!(result.options.len(), 2);
    assert!((result.options[0].percentage - 75.0).abs() < 1e-9);
    assert_eq!(result.question_id, question.id.to_hex());
    assert_percentages_consistent(&result);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["totalVotes"], 4);
    assert_eq!(json["votersCount"], 4);
    assert_eq!(json["options"][1]["text"], "B");
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Question;

/// Raw counts for one question as grouped by the vote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    /// option index -> number of votes that selected it
    pub counts: BTreeMap<i64, u64>,
    pub unique_voters: u64,
}

/// Derived snapshot of a question's results. Never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub text: String,
    pub options: Vec<OptionCount>,
    pub total_votes: u64,
    pub voters_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCount {
    pub index: usize,
    pub text: String,
    pub count: u64,
    pub percentage: f64,
}

impl QuestionResult {
    /// Builds the snapshot for `question` from grouped counts.
    ///
    /// A multi-select vote contributes one count to every option it selected,
    /// so `total_votes` is the sum of option counts and can exceed
    /// `voters_count`. Counts for indices outside the question's options are
    /// ignored so that the option counts always sum to `total_votes`.
    pub fn from_tally(question: &Question, tally: &VoteTally) -> Self {
        let counts: Vec<u64> = (0..question.options.len())
            .map(|i| tally.counts.get(&(i as i64)).copied().unwrap_or(0))
            .collect();
        let total_votes: u64 = counts.iter().sum();

        let options = question
            .options
            .iter()
            .zip(counts)
            .enumerate()
            .map(|(index, (text, count))| OptionCount {
                index,
                text: text.clone(),
                count,
                percentage: percentage(count, total_votes),
            })
            .collect();

        Self {
            question_id: question.id.to_hex(),
            text: question.text.clone(),
            options,
            total_votes,
            voters_count: tally.unique_voters,
        }
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

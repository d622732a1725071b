use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson};
use futures::TryStreamExt;
use livepoll_db::models::{Vote, VoteTally};
use mongodb::Database;
use serde::Deserialize;

use super::base::{BaseDao, DaoResult};
use crate::store::VoteStore;

pub struct VoteDao {
    pub base: BaseDao<Vote>,
}

/// One row of the `$unwind` / `$group` pipeline.
#[derive(Debug, Deserialize)]
struct OptionGroup {
    #[serde(rename = "_id")]
    option: i64,
    count: i64,
}

impl VoteDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Vote::COLLECTION),
        }
    }
}

#[async_trait]
impl VoteStore for VoteDao {
    async fn insert(&self, vote: &Vote) -> DaoResult<()> {
        self.base.insert_one(vote).await
    }

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Vote> {
        self.base.find_by_id(id).await
    }

    async fn tally(&self, session_id: ObjectId, question_id: ObjectId) -> DaoResult<VoteTally> {
        let filter = doc! { "session_id": session_id, "question_id": question_id };
        let pipeline = vec![
            doc! { "$match": filter.clone() },
            doc! { "$unwind": "$selected_options" },
            doc! { "$group": { "_id": "$selected_options", "count": { "$sum": 1 } } },
        ];

        let mut tally = VoteTally::default();
        let mut cursor = self.base.collection().aggregate(pipeline).await?;
        while let Some(row) = cursor.try_next().await? {
            let group: OptionGroup = bson::from_document(row)?;
            tally.counts.insert(group.option, group.count.max(0) as u64);
        }

        let voters: Vec<Bson> = self
            .base
            .collection()
            .distinct("participant_id", filter)
            .await?;
        tally.unique_voters = voters.len() as u64;

        Ok(tally)
    }
}

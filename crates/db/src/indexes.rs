use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::{Session, Vote};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Sessions
    create_indexes(
        db,
        Session::COLLECTION,
        vec![
            index_unique(bson::doc! { "join_code": 1 }),
            index(bson::doc! { "organizer_id": 1, "created_at": -1 }),
        ],
    )
    .await?;

    // Votes: one vote per participant per question is enforced here as well
    // as by the dedup lock.
    create_indexes(
        db,
        Vote::COLLECTION,
        vec![
            index_unique(bson::doc! { "session_id": 1, "question_id": 1, "participant_id": 1 }),
            index(bson::doc! { "session_id": 1, "question_id": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}

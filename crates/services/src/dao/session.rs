use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use livepoll_db::models::{Session, SessionStatus};
use mongodb::Database;

use super::base::{BaseDao, DaoError, DaoResult};
use crate::store::SessionStore;

pub struct SessionDao {
    pub base: BaseDao<Session>,
}

impl SessionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Session::COLLECTION),
        }
    }
}

#[async_trait]
impl SessionStore for SessionDao {
    async fn insert(&self, session: &Session) -> DaoResult<()> {
        self.base.insert_one(session).await
    }

    async fn find_by_id(&self, id: ObjectId) -> DaoResult<Session> {
        self.base.find_by_id(id).await
    }

    async fn find_by_join_code(&self, join_code: &str) -> DaoResult<Session> {
        self.base
            .find_one(doc! { "join_code": join_code })
            .await?
            .ok_or(DaoError::NotFound)
    }

    async fn list_by_organizer(&self, organizer_id: ObjectId) -> DaoResult<Vec<Session>> {
        self.base
            .find_many(
                doc! { "organizer_id": organizer_id },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    async fn update_status(&self, id: ObjectId, status: SessionStatus) -> DaoResult<bool> {
        self.base
            .update_by_id(id, doc! { "$set": { "status": status.as_str() } })
            .await
    }
}

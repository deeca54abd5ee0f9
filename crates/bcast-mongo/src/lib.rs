//! MongoDB-backed document store.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::FindOptions,
    Client, Collection, Database,
};
use tracing::{debug, info};

use bcast_core::{
    domain::ChatId,
    store::{Collections, DocumentStore, RecordSource},
    Error, Result,
};

pub struct MongoStore {
    db: Database,
    collections: Collections,
}

impl MongoStore {
    /// Connect and verify the deployment answers a ping.
    pub async fn connect(url: &str, db_name: &str, collections: Collections) -> Result<Self> {
        let client = Client::with_uri_str(url).await.map_err(store_err)?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(store_err)?;
        info!(db = db_name, "connected to MongoDB");
        Ok(Self { db, collections })
    }

    fn collection(&self, source: RecordSource) -> Collection<Document> {
        self.db.collection::<Document>(self.collections.name(source))
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ids(&self, source: RecordSource) -> Result<Vec<ChatId>> {
        let field = source.key_field();
        let opts = FindOptions::builder()
            .projection(doc! { field: 1, "_id": 0 })
            .build();
        let mut cursor = self
            .collection(source)
            .find(doc! {}, opts)
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(record) = cursor.try_next().await.map_err(store_err)? {
            match record.get(field).and_then(bson_to_i64) {
                Some(id) => out.push(ChatId(id)),
                None => debug!(?source, "record without a usable id"),
            }
        }
        Ok(out)
    }

    async fn count(&self, source: RecordSource) -> Result<u64> {
        self.collection(source)
            .count_documents(doc! {}, None)
            .await
            .map_err(store_err)
    }

    async fn delete_chat(&self, chat: ChatId) -> Result<u64> {
        let mut deleted = 0;
        for source in [RecordSource::Groups, RecordSource::Chats] {
            let res = self
                .collection(source)
                .delete_many(doc! { source.key_field(): chat.0 }, None)
                .await
                .map_err(store_err)?;
            deleted += res.deleted_count;
        }
        debug!(chat = %chat, deleted, "deleted group records");
        Ok(deleted)
    }
}

/// Ids are written by several tools; accept any integral numeric encoding.
fn bson_to_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

fn store_err(e: mongodb::error::Error) -> Error {
    Error::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_encodings_are_accepted() {
        assert_eq!(bson_to_i64(&Bson::Int32(-5)), Some(-5));
        assert_eq!(bson_to_i64(&Bson::Int64(-1001234567890)), Some(-1001234567890));
        assert_eq!(bson_to_i64(&Bson::Double(42.0)), Some(42));
    }

    #[test]
    fn non_integral_values_are_rejected() {
        assert_eq!(bson_to_i64(&Bson::Double(1.5)), None);
        assert_eq!(bson_to_i64(&Bson::Double(f64::NAN)), None);
        assert_eq!(bson_to_i64(&Bson::String("123".to_string())), None);
        assert_eq!(bson_to_i64(&Bson::Null), None);
    }
}

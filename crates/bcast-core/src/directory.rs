use std::{collections::BTreeSet, sync::Arc};

use tracing::warn;

use crate::{
    domain::ChatId,
    store::{DocumentStore, RecordSource},
};

/// Per-collection record counts plus the deduplicated recipient total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub users: u64,
    pub groups: u64,
    pub chats: u64,
    pub total_unique: usize,
}

/// Derives delivery targets from the document store.
///
/// Store failures never propagate: a failing collection contributes nothing
/// and the directory degrades to a partial (possibly empty) result.
#[derive(Clone)]
pub struct RecipientDirectory {
    store: Arc<dyn DocumentStore>,
}

impl RecipientDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Union of all users, groups and chats, in ascending id order.
    pub async fn all_recipients(&self) -> BTreeSet<ChatId> {
        self.collect(&RecordSource::ALL).await
    }

    /// Group ids (negative) from the two chat-keyed collections.
    pub async fn groups(&self) -> BTreeSet<ChatId> {
        let mut ids = self
            .collect(&[RecordSource::Groups, RecordSource::Chats])
            .await;
        ids.retain(|id| id.is_group());
        ids
    }

    pub async fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            users: self.count(RecordSource::Users).await,
            groups: self.count(RecordSource::Groups).await,
            chats: self.count(RecordSource::Chats).await,
            total_unique: self.all_recipients().await.len(),
        }
    }

    async fn collect(&self, sources: &[RecordSource]) -> BTreeSet<ChatId> {
        let mut out = BTreeSet::new();
        for &source in sources {
            match self.store.ids(source).await {
                Ok(ids) => out.extend(ids),
                Err(e) => warn!(?source, error = %e, "failed to read recipients"),
            }
        }
        out
    }

    async fn count(&self, source: RecordSource) -> u64 {
        match self.store.count(source).await {
            Ok(n) => n,
            Err(e) => {
                warn!(?source, error = %e, "failed to count records");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    #[tokio::test]
    async fn unions_and_dedupes_sources() {
        let store = FakeStore::default()
            .with(RecordSource::Users, &[1, 2, 3])
            .with(RecordSource::Groups, &[-100, -200])
            .with(RecordSource::Chats, &[-200, -300, 3]);
        let dir = RecipientDirectory::new(Arc::new(store));

        let ids: Vec<i64> = dir.all_recipients().await.into_iter().map(|c| c.0).collect();
        assert_eq!(ids, vec![-300, -200, -100, 1, 2, 3]);
    }

    #[tokio::test]
    async fn repeated_reads_are_stable() {
        let store = FakeStore::default()
            .with(RecordSource::Chats, &[9, -9])
            .with(RecordSource::Users, &[4]);
        let dir = RecipientDirectory::new(Arc::new(store));
        assert_eq!(dir.all_recipients().await, dir.all_recipients().await);
    }

    #[tokio::test]
    async fn failing_collection_yields_partial_result() {
        let store = FakeStore::default()
            .with(RecordSource::Users, &[1, 2])
            .with(RecordSource::Groups, &[-5])
            .failing(RecordSource::Users);
        let dir = RecipientDirectory::new(Arc::new(store));

        let ids: Vec<i64> = dir.all_recipients().await.into_iter().map(|c| c.0).collect();
        assert_eq!(ids, vec![-5]);

        let stats = dir.stats().await;
        assert_eq!(stats.users, 0);
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.total_unique, 1);
    }

    #[tokio::test]
    async fn groups_only_negative_chat_ids() {
        let store = FakeStore::default()
            .with(RecordSource::Users, &[-77])
            .with(RecordSource::Groups, &[-1, 10])
            .with(RecordSource::Chats, &[-2, -1]);
        let dir = RecipientDirectory::new(Arc::new(store));

        let ids: Vec<i64> = dir.groups().await.into_iter().map(|c| c.0).collect();
        assert_eq!(ids, vec![-2, -1]);
    }

    #[tokio::test]
    async fn stats_count_raw_records() {
        let store = FakeStore::default()
            .with(RecordSource::Users, &[1, 1, 2])
            .with(RecordSource::Groups, &[-1])
            .with(RecordSource::Chats, &[-1, -2]);
        let stats = RecipientDirectory::new(Arc::new(store)).stats().await;
        assert_eq!(
            stats,
            DirectoryStats {
                users: 3,
                groups: 1,
                chats: 2,
                total_unique: 4,
            }
        );
    }
}

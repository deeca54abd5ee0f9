use std::sync::Arc;

use tracing::info;

use bcast_core::{config::Config, store::DocumentStore};
use bcast_mongo::MongoStore;

#[tokio::main]
async fn main() -> Result<(), bcast_core::Error> {
    bcast_core::logging::init("bcast")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        db = %cfg.mongo_db,
        failed_chats = %cfg.failed_chats_file.display(),
        "configuration loaded"
    );

    let store: Arc<dyn DocumentStore> = Arc::new(
        MongoStore::connect(&cfg.mongo_url, &cfg.mongo_db, cfg.collections.clone()).await?,
    );

    bcast_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| bcast_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use bcast_core::{
    broadcast::Broadcaster, config::Config, confirm::Confirmations, denylist::DenylistStore,
    directory::RecipientDirectory, messaging::port::MessagingPort, platform::ChatPlatform,
    purge::MemberPurge, store::DocumentStore,
};

use crate::handlers;
use crate::{MemberRegistry, TelegramMessenger, TelegramPlatform};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    /// Without the leading `@`; empty when `get_me` failed at startup.
    pub bot_username: String,
    pub messenger: Arc<dyn MessagingPort>,
    pub registry: Arc<MemberRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub purge: Arc<MemberPurge>,
    pub confirmations: Arc<Confirmations>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        bot_username: String,
        store: Arc<dyn DocumentStore>,
        messenger: Arc<dyn MessagingPort>,
        platform: Arc<dyn ChatPlatform>,
        registry: Arc<MemberRegistry>,
    ) -> Self {
        let directory = RecipientDirectory::new(store);
        let broadcaster = Broadcaster::new(
            directory.clone(),
            platform.clone(),
            DenylistStore::new(cfg.failed_chats_file.clone()),
            cfg.broadcast,
        );
        let purge = MemberPurge::new(directory, platform, cfg.purge);
        Self {
            cfg,
            bot_username,
            messenger,
            registry,
            broadcaster: Arc::new(broadcaster),
            purge: Arc::new(purge),
            confirmations: Arc::new(Confirmations::new()),
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn DocumentStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "bot started");
            me.username().to_string()
        }
        Err(e) => {
            warn!(error = %e, "get_me failed; continuing");
            String::new()
        }
    };
    info!(admins = ?cfg.admin_ids, "admin ids");

    let registry = Arc::new(MemberRegistry::new());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let platform: Arc<dyn ChatPlatform> =
        Arc::new(TelegramPlatform::new(bot.clone(), registry.clone()));

    let state = Arc::new(AppState::new(
        cfg,
        bot_username,
        store,
        messenger,
        platform,
        registry,
    ));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

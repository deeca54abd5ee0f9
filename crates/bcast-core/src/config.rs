use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    broadcast::BroadcastSettings, errors::Error, purge::PurgeSettings, store::Collections,
    Result,
};

/// Typed configuration for the broadcast bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub admin_ids: Vec<i64>,

    // Document store
    pub mongo_url: String,
    pub mongo_db: String,
    pub collections: Collections,

    // Denylist
    pub failed_chats_file: PathBuf,

    // Runs
    pub broadcast: BroadcastSettings,
    pub purge: PurgeSettings,
    pub confirm_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let admin_ids = parse_csv_i64(env_str("BROADCAST_ADMIN_IDS"));
        let mongo_url = env_str("MONGO_URL").unwrap_or_default();

        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "BROADCAST_ADMIN_IDS environment variable is required".to_string(),
            ));
        }
        if mongo_url.trim().is_empty() {
            return Err(Error::Config(
                "MONGO_URL environment variable is required".to_string(),
            ));
        }

        let mongo_db = env_str("MONGO_DB")
            .and_then(non_empty)
            .unwrap_or_else(|| "Anon".to_string());
        let defaults = Collections::default();
        let collections = Collections {
            users: env_str("MONGO_USERS_COLLECTION")
                .and_then(non_empty)
                .unwrap_or(defaults.users),
            groups: env_str("MONGO_GROUPS_COLLECTION")
                .and_then(non_empty)
                .unwrap_or(defaults.groups),
            chats: env_str("MONGO_CHATS_COLLECTION")
                .and_then(non_empty)
                .unwrap_or(defaults.chats),
        };

        let failed_chats_file = PathBuf::from(
            env_str("FAILED_CHATS_FILE").unwrap_or("failed_chats.json".to_string()),
        );

        // Broadcast pacing
        let bd = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            pace_every: env_u64("BROADCAST_PACE_EVERY").unwrap_or(bd.pace_every).max(1),
            pace_pause: env_u64("BROADCAST_PACE_PAUSE_MS")
                .map(Duration::from_millis)
                .unwrap_or(bd.pace_pause),
            progress_every: env_u64("BROADCAST_PROGRESS_EVERY")
                .unwrap_or(bd.progress_every)
                .max(1),
            denylist_threshold: env_u32("DENYLIST_THRESHOLD")
                .unwrap_or(bd.denylist_threshold)
                .max(1),
        };

        // Bulk removal
        let pd = PurgeSettings::default();
        let purge = PurgeSettings {
            batch_size: env_usize("PURGE_BATCH_SIZE").unwrap_or(pd.batch_size).max(1),
            page_size: env_usize("PURGE_PAGE_SIZE").unwrap_or(pd.page_size).max(1),
            max_throttle_retries: env_u32("PURGE_MAX_THROTTLE_RETRIES")
                .unwrap_or(pd.max_throttle_retries),
            leave_delay: env_u64("PURGE_LEAVE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(pd.leave_delay),
        };

        let confirm_timeout = Duration::from_secs(env_u64("CONFIRM_TIMEOUT_SECS").unwrap_or(30));

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            mongo_url,
            mongo_db,
            collections,
            failed_chats_file,
            broadcast,
            purge,
            confirm_timeout,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_skip_garbage() {
        let ids = parse_csv_i64(Some(" 7355827552, x, ,-100123 ".to_string()));
        assert_eq!(ids, vec![7355827552, -100123]);
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"abc:def\"\nMONGO_DB='Anon'\n=novalue\nBROKEN\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc:def".to_string()),
                ("MONGO_DB".to_string(), "Anon".to_string()),
            ]
        );
    }
}

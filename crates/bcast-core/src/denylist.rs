//! Denylist of recipients with repeated delivery failures.
//!
//! Persisted as a single JSON object mapping the string-encoded chat id to its
//! consecutive-failure count, e.g. `{"-1001234": 2, "42": 3}`. Mutations stay in
//! memory and are flushed once per broadcast run.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{domain::ChatId, errors::Error, Result};

/// On-disk shape: `{"<chat id>": <count>}`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct DenylistFile {
    entries: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Denylist {
    entries: HashMap<ChatId, u32>,
}

impl Denylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, chat: ChatId) -> u32 {
        self.entries.get(&chat).copied().unwrap_or(0)
    }

    pub fn is_denied(&self, chat: ChatId, threshold: u32) -> bool {
        self.count(chat) >= threshold
    }

    /// Bump the failure count and return the new value.
    pub fn record_failure(&mut self, chat: ChatId) -> u32 {
        let count = self.entries.entry(chat).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forget the chat; returns whether it had an entry.
    pub fn clear(&mut self, chat: ChatId) -> bool {
        self.entries.remove(&chat).is_some()
    }

    pub fn clear_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_file(&self) -> DenylistFile {
        DenylistFile {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.0.to_string(), *v))
                .collect(),
        }
    }

    fn from_file(file: DenylistFile) -> Self {
        let mut entries = HashMap::new();
        for (k, v) in file.entries {
            match k.trim().parse::<i64>() {
                Ok(id) => {
                    entries.insert(ChatId(id), v);
                }
                Err(_) => warn!(key = %k, "skipping non-numeric denylist key"),
            }
        }
        Self { entries }
    }
}

impl FromIterator<(ChatId, u32)> for Denylist {
    fn from_iter<I: IntoIterator<Item = (ChatId, u32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// File-backed persistence for the denylist.
#[derive(Clone, Debug)]
pub struct DenylistStore {
    path: PathBuf,
}

impl DenylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted denylist. A missing or unreadable file yields an empty list.
    pub fn load(&self) -> Denylist {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Denylist::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read denylist");
                return Denylist::new();
            }
        };
        if txt.trim().is_empty() {
            return Denylist::new();
        }

        match serde_json::from_str::<DenylistFile>(&txt) {
            Ok(file) => Denylist::from_file(file),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed denylist");
                Denylist::new()
            }
        }
    }

    /// Overwrite the persisted denylist (temp file + rename).
    pub fn save(&self, list: &Denylist) -> Result<()> {
        let tmp = self.tmp_path()?;
        let txt = serde_json::to_string_pretty(&list.to_file())?;
        fs::write(&tmp, txt)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> Result<PathBuf> {
        let Some(name) = self.path.file_name() else {
            return Err(Error::InvalidPath {
                path: self.path.clone(),
                reason: "denylist path has no file name".to_string(),
            });
        };
        let mut name = name.to_os_string();
        name.push(".tmp");
        Ok(self.path.with_file_name(name))
    }
}

//! Contact whitelist: the set of senders authorized to reach the agent.
//!
//! Ids are normalized on every check and add:
//! - surrounding whitespace is trimmed
//! - ids carrying a channel-native suffix (`@lid`, `@s.whatsapp.net`, `@g.us`)
//!   are kept verbatim and only ever matched exactly
//! - anything else starting with a digit gets a leading `+`
//!
//! Phone numbers match with or without the `+`. The set is stored as
//! `{ whitelisted_contacts: [sorted ids] }` YAML and every mutation is written
//! out before it returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Suffixes marking a channel-native id.
const NATIVE_SUFFIX_MARKERS: &[&str] = &["@lid", "@s.whatsapp.net", "@g.us"];

#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("Failed to write contacts file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize contacts: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContactsFile {
    #[serde(default)]
    whitelisted_contacts: Vec<String>,
}

/// Normalize a contact id.
pub fn normalize_contact(id: &str) -> String {
    let trimmed = id.trim();
    if is_native(trimmed) {
        trimmed.to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("+{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn is_native(id: &str) -> bool {
    NATIVE_SUFFIX_MARKERS.iter().any(|m| id.contains(m))
}

/// The same phone number written the other way (with/without `+`).
fn alternate_form(normalized: &str) -> Option<String> {
    if is_native(normalized) {
        return None;
    }
    if let Some(rest) = normalized.strip_prefix('+') {
        Some(rest.to_string())
    } else {
        Some(format!("+{normalized}"))
    }
}

/// File-backed contact whitelist.
///
/// Cheap to consult from many tasks; wrap in an `Arc` to share between a
/// channel and the CLI.
#[derive(Debug)]
pub struct ContactWhitelist {
    path: PathBuf,
    contacts: RwLock<BTreeSet<String>>,
}

impl ContactWhitelist {
    /// Open the whitelist at `path`.
    ///
    /// A missing file is created empty. A file that cannot be read or parsed
    /// yields an empty set, which authorizes nobody.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let contacts = load_contacts(&path);
        Self {
            path,
            contacts: RwLock::new(contacts),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a contact may interact with the agent.
    pub fn is_whitelisted(&self, id: &str) -> bool {
        let normalized = normalize_contact(id);
        let contacts = self.read();
        contacts.contains(&normalized)
            || alternate_form(&normalized).is_some_and(|alt| contacts.contains(&alt))
    }

    /// Alias of [`is_whitelisted`](Self::is_whitelisted).
    pub fn contains(&self, id: &str) -> bool {
        self.is_whitelisted(id)
    }

    /// Add a contact. Returns `Ok(false)` if it was already present in either form.
    pub fn add(&self, id: &str) -> Result<bool, WhitelistError> {
        let normalized = normalize_contact(id);
        if normalized.is_empty() {
            return Ok(false);
        }

        let mut contacts = self.write();
        let present = contacts.contains(&normalized)
            || alternate_form(&normalized).is_some_and(|alt| contacts.contains(&alt));
        if present {
            debug!(contact = %normalized, "Contact already whitelisted");
            return Ok(false);
        }

        contacts.insert(normalized.clone());
        if let Err(e) = self.persist(&contacts) {
            contacts.remove(&normalized);
            return Err(e);
        }
        info!(contact = %normalized, "Added contact to whitelist");
        Ok(true)
    }

    /// Remove a contact in both its forms. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool, WhitelistError> {
        let normalized = normalize_contact(id);
        let raw = id.trim().to_string();

        let mut contacts = self.write();
        let mut candidates = vec![normalized.clone(), raw];
        candidates.extend(alternate_form(&normalized));

        let removed: Vec<String> = candidates
            .into_iter()
            .filter(|c| contacts.remove(c))
            .collect();
        if removed.is_empty() {
            debug!(contact = %normalized, "Contact not in whitelist");
            return Ok(false);
        }

        if let Err(e) = self.persist(&contacts) {
            contacts.extend(removed);
            return Err(e);
        }
        info!(contact = %normalized, "Removed contact from whitelist");
        Ok(true)
    }

    /// All contacts, sorted.
    pub fn list_all(&self) -> Vec<String> {
        self.read().iter().cloned().collect()
    }

    /// Re-read the backing file, replacing the in-memory set.
    pub fn reload(&self) {
        let fresh = load_contacts(&self.path);
        *self.write() = fresh;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn persist(&self, contacts: &BTreeSet<String>) -> Result<(), WhitelistError> {
        write_contacts(&self.path, contacts)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<String>> {
        self.contacts.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<String>> {
        self.contacts.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_contacts(path: &Path) -> BTreeSet<String> {
    if !path.exists() {
        info!(path = %path.display(), "Contacts file not found, creating empty whitelist");
        let empty = BTreeSet::new();
        if let Err(e) = write_contacts(path, &empty) {
            warn!(error = %e, "Could not create contacts file");
        }
        return empty;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read contacts file");
            return BTreeSet::new();
        }
    };

    if content.trim().is_empty() {
        return BTreeSet::new();
    }

    match serde_yaml::from_str::<ContactsFile>(&content) {
        Ok(file) => {
            let contacts: BTreeSet<String> = file
                .whitelisted_contacts
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            info!(count = contacts.len(), "Loaded whitelisted contacts");
            contacts
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse contacts file");
            BTreeSet::new()
        }
    }
}

fn write_contacts(path: &Path, contacts: &BTreeSet<String>) -> Result<(), WhitelistError> {
    let file = ContactsFile {
        whitelisted_contacts: contacts.iter().cloned().collect(),
    };
    let yaml = serde_yaml::to_string(&file)?;

    let io = |source: std::io::Error| WhitelistError::Persist {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, yaml).map_err(io)
}

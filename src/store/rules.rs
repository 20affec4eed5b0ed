//! File-backed rule store.
//!
//! Maps destination group ids to their source filter. The whole map lives
//! in memory behind one lock and is rewritten to disk after every mutation
//! with an atomic replace (temp file + rename). The file layout is:
//!
//! ```json
//! {
//!   "enabled_groups": {
//!     "123456": {
//!       "discord_filter": {"guild_id": "1", "channel_id": "2"},
//!       "adapter_name": "aiocqhttp",
//!       "enabled_at": "2024-03-01T12:34:56.789+08:00"
//!     }
//!   },
//!   "message_template": "..."
//! }
//! ```
//!
//! Keys the bridge does not know about are carried through rewrites.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::pipeline::types::deserialize_optional_id;

// ── Rule types ──────────────────────────────────────────────────────

/// Source-side filter. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFilter {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub guild_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SourceFilter {
    pub fn new(guild_id: Option<&str>, channel_id: Option<&str>) -> Self {
        Self {
            guild_id: non_empty(guild_id),
            channel_id: non_empty(channel_id),
            extra: serde_json::Map::new(),
        }
    }

    /// Effective guild filter; an empty string counts as unset.
    pub fn guild(&self) -> Option<&str> {
        self.guild_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Effective channel filter; an empty string counts as unset.
    pub fn channel(&self) -> Option<&str> {
        self.channel_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.guild().is_none() && self.channel().is_none()
    }
}

/// Forwarding rule for one destination group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "discord_filter", default)]
    pub filter: SourceFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_name: Option<String>,
    #[serde(default = "Local::now", deserialize_with = "deserialize_enabled_at")]
    pub enabled_at: DateTime<Local>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Offset-less layouts older rule files use for `enabled_at`.
const NAIVE_ENABLED_AT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse RFC 3339, else an offset-less ISO-8601 date-time read as local time.
pub fn parse_enabled_at(text: &str) -> Option<DateTime<Local>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Local));
    }
    NAIVE_ENABLED_AT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
}

/// An unreadable time never fails the rule file; it is replaced by now.
fn deserialize_enabled_at<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Local>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_enabled_at);
    Ok(parsed.unwrap_or_else(|| {
        warn!(value = ?raw, "Unreadable enabled_at in rule file, using now");
        Local::now()
    }))
}

// ── Ordered rule map ────────────────────────────────────────────────

/// Destination id → rule, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleMap {
    entries: Vec<(String, Rule)>,
}

impl RuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, destination_group_id: &str) -> Option<&Rule> {
        self.entries
            .iter()
            .find(|(id, _)| id == destination_group_id)
            .map(|(_, rule)| rule)
    }

    /// Insert, or replace in place when the id already exists.
    pub fn insert(&mut self, destination_group_id: String, rule: Rule) -> Option<Rule> {
        match self
            .entries
            .iter()
            .position(|(id, _)| *id == destination_group_id)
        {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, rule)),
            None => {
                self.entries.push((destination_group_id, rule));
                None
            }
        }
    }

    pub fn remove(&mut self, destination_group_id: &str) -> Option<Rule> {
        let idx = self
            .entries
            .iter()
            .position(|(id, _)| id == destination_group_id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.entries.iter().map(|(id, rule)| (id.as_str(), rule))
    }

    pub fn as_slice(&self) -> &[(String, Rule)] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<(String, Rule)> {
        self.entries
    }
}

impl Serialize for RuleMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, rule) in &self.entries {
            map.serialize_entry(id, rule)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleMapVisitor;

        impl<'de> Visitor<'de> for RuleMapVisitor {
            type Value = RuleMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of destination group ids to rules")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleMap, A::Error> {
                let mut map = RuleMap::new();
                // Document order is kept; a repeated key keeps its first slot.
                while let Some((id, rule)) = access.next_entry::<String, Rule>()? {
                    map.insert(id, rule);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(RuleMapVisitor)
    }
}

/// On-disk document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub enabled_groups: RuleMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Store ───────────────────────────────────────────────────────────

/// Rule store with an in-memory copy of the rule file.
///
/// Reads clone out of the lock; mutations hold the write lock through the
/// disk write so no reader sees a map the file does not agree with.
pub struct RuleStore {
    path: PathBuf,
    state: RwLock<RuleFile>,
}

impl RuleStore {
    /// Create an empty store backed by `path` without touching the disk.
    pub fn in_memory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(RuleFile::default()),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing, unreadable, or corrupt file all produce an empty store;
    /// the failure is logged, never returned.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match read_rule_file(&path).await {
            Ok(Some(file)) => {
                info!(
                    path = %path.display(),
                    rules = file.enabled_groups.len(),
                    "Loaded bridge rules"
                );
                file
            }
            Ok(None) => {
                info!(path = %path.display(), "No rule file, starting fresh");
                RuleFile::default()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load rule file, starting with no rules"
                );
                RuleFile::default()
            }
        };
        Self {
            path,
            state: RwLock::new(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enable forwarding into `destination_group_id`, replacing any rule it
    /// already has.
    pub async fn add_rule(
        &self,
        destination_group_id: &str,
        adapter_name: &str,
        guild_filter: Option<&str>,
        channel_filter: Option<&str>,
    ) -> Rule {
        let rule = Rule {
            filter: SourceFilter::new(guild_filter, channel_filter),
            adapter_name: Some(adapter_name.to_string()),
            enabled_at: Local::now(),
            extra: serde_json::Map::new(),
        };

        let mut state = self.state.write().await;
        let replaced = state
            .enabled_groups
            .insert(destination_group_id.to_string(), rule.clone());
        info!(
            destination = destination_group_id,
            adapter = adapter_name,
            guild = ?rule.filter.guild(),
            channel = ?rule.filter.channel(),
            replaced = replaced.is_some(),
            "Bridge rule enabled"
        );
        self.persist_logged(&state).await;
        rule
    }

    /// Remove the rule for `destination_group_id`. Returns false, without
    /// writing, when there was none.
    pub async fn remove_rule(&self, destination_group_id: &str) -> bool {
        let mut state = self.state.write().await;
        if state.enabled_groups.remove(destination_group_id).is_none() {
            debug!(destination = destination_group_id, "No rule to remove");
            return false;
        }
        info!(destination = destination_group_id, "Bridge rule removed");
        self.persist_logged(&state).await;
        true
    }

    /// All rules in store order.
    pub async fn list_rules(&self) -> Vec<(String, Rule)> {
        self.state.read().await.enabled_groups.clone().into_vec()
    }

    /// Read-only copy of the rule map for one routing decision.
    pub async fn snapshot(&self) -> RuleMap {
        self.state.read().await.enabled_groups.clone()
    }

    pub async fn rule(&self, destination_group_id: &str) -> Option<Rule> {
        self.state
            .read()
            .await
            .enabled_groups
            .get(destination_group_id)
            .cloned()
    }

    /// Template override stored alongside the rules.
    pub async fn template(&self) -> Option<String> {
        self.state.read().await.message_template.clone()
    }

    /// Store a template override. The caller validates it first.
    pub async fn set_template(&self, template: &str) {
        let mut state = self.state.write().await;
        state.message_template = Some(template.to_string());
        info!("Message template updated");
        self.persist_logged(&state).await;
    }

    /// Write the current state to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let state = self.state.read().await;
        write_rule_file(&self.path, &state).await
    }

    async fn persist_logged(&self, state: &RuleFile) {
        if let Err(e) = write_rule_file(&self.path, state).await {
            error!(
                path = %self.path.display(),
                error = %e,
                "Failed to save rule file; changes are kept in memory only"
            );
        }
    }
}

/// `Ok(None)` when the file does not exist.
async fn read_rule_file(path: &Path) -> Result<Option<RuleFile>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_rule_file(path: &Path, file: &RuleFile) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(file).map_err(StoreError::Serialize)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    atomic_write_file(path, &data).await
}

/// Write to a uniquely named sibling temp file, fsync, then rename over
/// `final_path`.
async fn atomic_write_file(final_path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("rules.json");
    let temp_path =
        final_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = write_and_rename(&temp_path, final_path, data).await;
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

async fn write_and_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| StoreError::io(temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::io(temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io(temp_path, e))?;
    fs::rename(temp_path, final_path)
        .await
        .map_err(|e| StoreError::io(final_path, e))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

//! Channel to project resolution.
//!
//! A [`ChannelProjectMapping`] is an immutable table built once from
//! configuration. [`ChannelDirectory`] holds the current table and lets a
//! refresh swap in a new one without disturbing requests that already
//! took a snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ProjectsError, ProjectsResult};
use crate::types::ProjectReference;

/// Channel id to project number table for one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelProjectMapping {
    org: String,
    channels: BTreeMap<String, u32>,
}

impl ChannelProjectMapping {
    /// Create an empty mapping for an organization.
    pub fn empty(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            channels: BTreeMap::new(),
        }
    }

    /// Build a mapping from `(channel id, project number)` pairs.
    ///
    /// Every entry is validated as a [`ProjectReference`]; one bad entry
    /// rejects the whole table.
    pub fn from_entries<I, C>(org: impl Into<String>, entries: I) -> ProjectsResult<Self>
    where
        I: IntoIterator<Item = (C, i64)>,
        C: Into<String>,
    {
        let org = org.into();
        let mut channels = BTreeMap::new();

        for (channel, number) in entries {
            let channel = channel.into();
            let channel_key = channel.trim();
            if channel_key.is_empty() {
                return Err(ProjectsError::Config(
                    "channel mapping contains an empty channel id".to_string(),
                ));
            }
            let project = ProjectReference::new(org.clone(), number).map_err(|e| {
                ProjectsError::Config(format!("channel {}: {}", channel_key, e))
            })?;
            channels.insert(channel_key.to_string(), project.number());
        }

        Ok(Self { org, channels })
    }

    /// Resolve a channel to its project. Exact match only.
    pub fn resolve(&self, channel_id: &str) -> ProjectsResult<ProjectReference> {
        match self.channels.get(channel_id) {
            Some(number) => ProjectReference::new(self.org.clone(), i64::from(*number)),
            None => Err(ProjectsError::UnmappedChannel {
                channel_id: channel_id.to_string(),
            }),
        }
    }

    /// Organization the mapping belongs to.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Number of mapped channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is mapped.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Process-wide holder of the current channel mapping.
#[derive(Debug)]
pub struct ChannelDirectory {
    current: RwLock<Arc<ChannelProjectMapping>>,
}

impl ChannelDirectory {
    /// Create a directory serving the given mapping.
    pub fn new(mapping: ChannelProjectMapping) -> Self {
        Self {
            current: RwLock::new(Arc::new(mapping)),
        }
    }

    /// The mapping as of now. Later replacements do not affect it.
    pub fn snapshot(&self) -> Arc<ChannelProjectMapping> {
        self.current.read().clone()
    }

    /// Swap in a new mapping.
    pub fn replace(&self, mapping: ChannelProjectMapping) {
        debug!(channels = mapping.len(), "Replacing channel mapping");
        *self.current.write() = Arc::new(mapping);
    }

    /// Resolve a channel against the current mapping.
    pub fn resolve(&self, channel_id: &str) -> ProjectsResult<ProjectReference> {
        self.snapshot().resolve(channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mapping() -> ChannelProjectMapping {
        ChannelProjectMapping::from_entries(
            "acme",
            vec![("C_AGENTS", 2), ("C_AGENTS_DEV", 2), ("C_MAPS", 9)],
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_mapped_channel() {
        let mapping = sample_mapping();
        let project = mapping.resolve("C_MAPS").unwrap();
        assert_eq!(project.org(), "acme");
        assert_eq!(project.number(), 9);

        // Stable across calls
        assert_eq!(mapping.resolve("C_MAPS").unwrap(), project);
        assert_eq!(mapping.resolve("C_AGENTS_DEV").unwrap().number(), 2);
    }

    #[test]
    fn test_resolve_unmapped_channel() {
        let mapping = sample_mapping();
        let err = mapping.resolve("C_UNKNOWN").unwrap_err();
        assert!(matches!(
            err,
            ProjectsError::UnmappedChannel { ref channel_id } if channel_id == "C_UNKNOWN"
        ));
    }

    #[test]
    fn test_resolve_requires_exact_match() {
        let mapping = sample_mapping();
        assert!(mapping.resolve("c_maps").is_err());
        assert!(mapping.resolve("C_MAP").is_err());
        assert!(mapping.resolve("").is_err());
    }

    #[test]
    fn test_from_entries_rejects_invalid_numbers() {
        let err = ChannelProjectMapping::from_entries("acme", vec![("C1", 0)]).unwrap_err();
        assert!(matches!(err, ProjectsError::Config(ref msg) if msg.contains("C1")));

        let err = ChannelProjectMapping::from_entries("acme", vec![("  ", 3)]).unwrap_err();
        assert!(matches!(err, ProjectsError::Config(_)));
    }

    #[test]
    fn test_empty_mapping() {
        let mapping = ChannelProjectMapping::empty("acme");
        assert!(mapping.is_empty());
        assert!(mapping.resolve("C1").is_err());
    }

    #[test]
    fn test_directory_replace_keeps_old_snapshots() {
        let directory = ChannelDirectory::new(sample_mapping());
        let before = directory.snapshot();

        let updated =
            ChannelProjectMapping::from_entries("acme", vec![("C_MAPS", 12), ("C_NEW", 4)])
                .unwrap();
        directory.replace(updated);

        assert_eq!(before.resolve("C_MAPS").unwrap().number(), 9);
        assert_eq!(directory.resolve("C_MAPS").unwrap().number(), 12);
        assert_eq!(directory.resolve("C_NEW").unwrap().number(), 4);
        assert!(directory.resolve("C_AGENTS").is_err());
    }
}

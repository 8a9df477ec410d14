//! The master index: every version record plus the active pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::VersionRecord;
use super::{format_id, parse_sequence};

/// Current on-disk format of `versions_index.json`.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Master index. `versions` keeps creation order and serializes as an
/// object keyed by version id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionIndex {
    /// Format tag of the index file itself
    pub schema_version: u32,
    /// Write counter; the optimistic concurrency token
    pub revision: u64,
    /// Time of the last committed write
    pub updated_at: Option<DateTime<Utc>>,
    /// Currently live version
    pub active: Option<String>,
    #[serde(with = "ordered_versions")]
    versions: Vec<VersionRecord>,
}

impl Default for VersionIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl VersionIndex {
    /// The bootstrap index: no versions, nothing active, revision 0.
    pub fn empty() -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            revision: 0,
            updated_at: None,
            active: None,
            versions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &VersionRecord> {
        self.versions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|r| r.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&VersionRecord> {
        self.versions.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn active_record(&self) -> Option<&VersionRecord> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn latest(&self) -> Option<&VersionRecord> {
        self.versions.last()
    }

    /// `max(numeric suffixes) + 1`, or 1 for an empty index.
    pub fn next_sequence(&self, prefix: &str) -> u64 {
        self.versions
            .iter()
            .filter_map(|r| parse_sequence(&r.id, prefix))
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn next_id(&self, prefix: &str) -> String {
        format_id(prefix, self.next_sequence(prefix))
    }

    pub(crate) fn push(&mut self, record: VersionRecord) {
        self.versions.push(record);
    }
}

mod ordered_versions {
    use std::fmt;

    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::VersionRecord;

    pub fn serialize<S: Serializer>(
        versions: &[VersionRecord],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(versions.len()))?;
        for record in versions {
            map.serialize_entry(&record.id, record)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<VersionRecord>, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Vec<VersionRecord>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of version id to version record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut out: Vec<VersionRecord> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, record)) = map.next_entry::<String, VersionRecord>()? {
                    if key != record.id {
                        return Err(A::Error::custom(format!(
                            "entry '{}' holds a record with id '{}'",
                            key, record.id
                        )));
                    }
                    if out.iter().any(|r| r.id == key) {
                        return Err(A::Error::custom(format!("duplicate version id '{}'", key)));
                    }
                    out.push(record);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

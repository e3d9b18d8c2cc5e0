use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::ContextId;

/// Attempt-existence flags for one course and its activities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseAttemptEntry {
    /// Attempts attached directly to the course context.
    pub value: bool,
    /// Per-activity flags for the activities known at build time.
    pub subcontext: BTreeMap<ContextId, bool>,
}

impl CourseAttemptEntry {
    #[must_use]
    pub fn new(value: bool, subcontext: BTreeMap<ContextId, bool>) -> Self {
        Self { value, subcontext }
    }

    /// True when the course or any known activity has attempts.
    #[must_use]
    pub fn any(&self) -> bool {
        self.value || self.subcontext.values().any(|has| *has)
    }

    /// `None` means the activity was unknown when the entry was built.
    #[must_use]
    pub fn activity(&self, id: ContextId) -> Option<bool> {
        self.subcontext.get(&id).copied()
    }

    pub fn set_activity(&mut self, id: ContextId, has_attempts: bool) {
        self.subcontext.insert(id, has_attempts);
    }

    /// Activities flagged as having attempts, in id order.
    #[must_use]
    pub fn activities_with_attempts(&self) -> Vec<ContextId> {
        self.subcontext
            .iter()
            .filter_map(|(id, has)| has.then_some(*id))
            .collect()
    }
}

/// Shapes a cache value can take at the storage boundary.
///
/// Older writers stored only `{ "value": bool }`. Such entries are never
/// trusted and read as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StoredEntry {
    Valid(CourseAttemptEntry),
    Legacy { value: bool },
}

#[derive(Deserialize)]
struct RawEntry {
    value: bool,
    #[serde(default)]
    subcontext: Option<BTreeMap<ContextId, bool>>,
}

// Decoded through a plain struct: buffered untagged decoding cannot read numeric map keys.
impl<'de> Deserialize<'de> for StoredEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEntry::deserialize(deserializer)?;
        Ok(match raw.subcontext {
            Some(subcontext) => StoredEntry::Valid(CourseAttemptEntry::new(raw.value, subcontext)),
            None => StoredEntry::Legacy { value: raw.value },
        })
    }
}

impl StoredEntry {
    #[must_use]
    pub fn into_valid(self) -> Option<CourseAttemptEntry> {
        match self {
            StoredEntry::Valid(entry) => Some(entry),
            StoredEntry::Legacy { .. } => None,
        }
    }
}

impl From<CourseAttemptEntry> for StoredEntry {
    fn from(entry: CourseAttemptEntry) -> Self {
        StoredEntry::Valid(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_payload_is_not_valid() {
        let stored: StoredEntry = serde_json::from_str(r#"{"value":false}"#).unwrap();
        assert_eq!(stored, StoredEntry::Legacy { value: false });
        assert_eq!(stored.into_valid(), None);
    }

    #[test]
    fn two_field_payload_is_valid() {
        let stored: StoredEntry =
            serde_json::from_str(r#"{"value":false,"subcontext":{"12":true,"13":false}}"#)
                .unwrap();
        let entry = stored.into_valid().expect("valid entry");
        assert_eq!(entry.activity(ContextId::new(12)), Some(true));
        assert_eq!(entry.activity(ContextId::new(13)), Some(false));
        assert_eq!(entry.activity(ContextId::new(14)), None);
        assert!(entry.any());
    }

    #[test]
    fn serialized_entry_reads_back_as_valid() {
        let mut entry = CourseAttemptEntry::default();
        entry.set_activity(ContextId::new(5), false);
        let json = serde_json::to_string(&StoredEntry::from(entry.clone())).unwrap();
        let back: StoredEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_valid(), Some(entry));
    }

    #[test]
    fn activities_with_attempts_lists_true_flags() {
        let mut entry = CourseAttemptEntry::new(true, BTreeMap::new());
        entry.set_activity(ContextId::new(3), true);
        entry.set_activity(ContextId::new(1), false);
        entry.set_activity(ContextId::new(2), true);
        assert_eq!(
            entry.activities_with_attempts(),
            vec![ContextId::new(2), ContextId::new(3)]
        );
    }
}

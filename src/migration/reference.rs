use std::collections::HashSet;

use super::model::SourceId;

/// Run-scoped set of product references already handed out.
///
/// A reference is proposed before the insert and committed once the row
/// exists, so a failed insert never reserves its serial.
#[derive(Debug, Default, Clone)]
pub struct ReferenceRegistry {
    used: HashSet<String>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference `serial` would get: trimmed, or `{serial}-{source_id}`
    /// when already taken, then `{serial}-{source_id}-{n}` until free.
    /// Blank serials have no reference.
    pub fn propose(&self, serial: Option<&str>, source_id: &SourceId) -> Option<String> {
        let serial = serial.map(str::trim).filter(|s| !s.is_empty())?;
        if !self.used.contains(serial) {
            return Some(serial.to_string());
        }
        let suffixed = format!("{serial}-{source_id}");
        if !self.used.contains(&suffixed) {
            return Some(suffixed);
        }
        (2u64..)
            .map(|n| format!("{suffixed}-{n}"))
            .find(|candidate| !self.used.contains(candidate))
    }

    pub fn commit(&mut self, reference: &str) {
        self.used.insert(reference.to_string());
    }

    /// Propose and commit in one step.
    pub fn make_unique(&mut self, serial: Option<&str>, source_id: &SourceId) -> Option<String> {
        let reference = self.propose(serial, source_id)?;
        self.commit(&reference);
        Some(reference)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.used.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn clear(&mut self) {
        self.used.clear();
    }
}

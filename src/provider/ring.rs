//! Ordered provider ring with a stored rotation start.

use crate::error::{AuraError, Result};

/// Fixed, ordered list of interchangeable provider ids.
///
/// Each request walks the whole ring once, starting at the preferred index
/// and wrapping around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRing {
    ids: Vec<String>,
    preferred: usize,
}

impl ProviderRing {
    pub fn new<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(AuraError::ConfigInvalidValue {
                key: "text.ring".to_string(),
                message: "provider ring is empty".to_string(),
            });
        }
        Ok(Self { ids, preferred: 0 })
    }

    pub fn with_preferred(mut self, id: &str) -> Result<Self> {
        self.preferred = self.index_of(id).ok_or_else(|| AuraError::ConfigInvalidValue {
            key: "text.preferred".to_string(),
            message: format!("'{id}' is not in the ring"),
        })?;
        Ok(self)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|p| p == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn preferred(&self) -> &str {
        &self.ids[self.preferred]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in attempt order starting at `preferred`; unknown ids start at the stored index.
    pub fn rotation_from(&self, preferred: &str) -> impl Iterator<Item = &str> {
        self.rotation_at(self.index_of(preferred).unwrap_or(self.preferred))
    }

    fn rotation_at(&self, start: usize) -> impl Iterator<Item = &str> {
        let n = self.ids.len();
        (0..n).map(move |i| self.ids[(start + i) % n].as_str())
    }
}

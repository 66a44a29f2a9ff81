//! Content-addressed paper identifiers.
//!
//! A [`PaperId`] keys the backup directory of one paper. It is the MD5 hex
//! digest of the document locator's base name, so re-parsing the same URL
//! always lands in the same directory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-character lowercase hex identifier of a paper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    /// Derive the identifier for a document locator.
    ///
    /// The last path segment is hashed with its document extension removed
    /// (`…/paper.pdf` → `paper`). Segments whose dotted suffix is not a short
    /// alphabetic extension (arXiv ids such as `2602.12852v1`) are not split;
    /// the whole trimmed locator is hashed instead.
    pub fn from_locator(locator: &str) -> Self {
        let key = hash_key(locator);
        Self(format!("{:x}", md5::compute(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for PaperId {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

fn hash_key(locator: &str) -> &str {
    let trimmed = locator.trim().trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);

    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_document_extension(ext) => stem,
        _ => trimmed,
    }
}

fn is_document_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = PaperId::from_locator("https://arxiv.org/pdf/2602.12852v1.pdf");
        let b = PaperId::from_locator("https://arxiv.org/pdf/2602.12852v1.pdf");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hashes_stem_of_document_name() {
        let id = PaperId::from_locator("https://example.com/files/paper.pdf");
        assert_eq!(id.as_str(), format!("{:x}", md5::compute(b"paper")));
    }

    #[test]
    fn trailing_slash_ignored() {
        assert_eq!(
            PaperId::from_locator("https://example.com/files/paper.pdf/"),
            PaperId::from_locator("https://example.com/files/paper.pdf"),
        );
    }

    #[test]
    fn arxiv_versions_stay_distinct() {
        let v1 = PaperId::from_locator("https://arxiv.org/abs/2602.12852v1");
        let v2 = PaperId::from_locator("https://arxiv.org/abs/2602.12852v2");
        let other = PaperId::from_locator("https://arxiv.org/abs/2602.99999v1");
        assert_ne!(v1, v2);
        assert_ne!(v1, other);
    }

    #[test]
    fn arxiv_pdf_keeps_version_in_key() {
        assert_eq!(
            hash_key("https://arxiv.org/pdf/2602.12852v1.pdf"),
            "2602.12852v1"
        );
    }

    #[test]
    fn displays_as_hex() {
        let id = PaperId::from_locator("x.pdf");
        assert_eq!(id.to_string(), id.as_str());
    }
}

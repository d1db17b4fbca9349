//! Cookie chunking
//!
//! Browsers cap a single cookie at roughly 4KB, so large session envelopes
//! are spread over `name.0`, `name.1`, … with `name.count` recording how
//! many pieces make up the set. A set that is missing any piece, or whose
//! indices are not exactly `0..count`, is rejected as a whole.

use std::collections::BTreeMap;

use thiserror::Error;

/// Suffix of the sibling cookie holding the number of chunks
pub const COUNT_SUFFIX: &str = "count";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("cookie '{0}' has chunks but no chunk count")]
    MissingCount(String),
    #[error("cookie '{name}' declares an invalid chunk count '{value}'")]
    InvalidCount { name: String, value: String },
    #[error("cookie '{name}' declares {declared} chunks but indices {found:?} were found")]
    Incomplete {
        name: String,
        declared: usize,
        found: Vec<usize>,
    },
}

/// Ordered cookie fragments making up one logical cookie value.
///
/// A set with a single segment is written under the base name itself;
/// anything larger uses indexed names plus the count sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieChunkSet {
    name: String,
    segments: Vec<String>,
}

impl CookieChunkSet {
    /// Split `payload` into segments of at most `max_segment` bytes.
    ///
    /// Splitting only happens when the payload exceeds `max_segment`, and
    /// segment boundaries always fall on character boundaries.
    #[must_use]
    pub fn split(name: &str, payload: &str, max_segment: usize) -> Self {
        let max_segment = max_segment.max(1);
        if payload.len() <= max_segment {
            return Self {
                name: name.to_string(),
                segments: vec![payload.to_string()],
            };
        }

        let mut segments = Vec::with_capacity(payload.len() / max_segment + 1);
        let mut current = String::with_capacity(max_segment);
        for ch in payload.chars() {
            if current.len() + ch.len_utf8() > max_segment {
                segments.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            segments.push(current);
        }

        Self {
            name: name.to_string(),
            segments,
        }
    }

    /// Reassemble a chunk set from the cookies present on a request.
    ///
    /// Returns `Ok(None)` when neither the base cookie nor any chunk exists.
    ///
    /// # Errors
    ///
    /// Returns a `ChunkError` when chunks exist but the count is missing or
    /// invalid, or the indices found are not exactly `0..count`.
    pub fn from_cookies<'a, I>(name: &str, cookies: I) -> Result<Option<Self>, ChunkError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let count_name = Self::count_name(name);
        let mut base = None;
        let mut count = None;
        let mut indexed = BTreeMap::new();

        for (cookie_name, value) in cookies {
            if cookie_name == name {
                base = Some(value);
            } else if cookie_name == count_name {
                count = Some(value);
            } else if let Some(index) = Self::chunk_index(name, cookie_name) {
                indexed.insert(index, value);
            }
        }

        if count.is_none() && indexed.is_empty() {
            return Ok(base.map(|value| Self {
                name: name.to_string(),
                segments: vec![value.to_string()],
            }));
        }

        let Some(count) = count else {
            return Err(ChunkError::MissingCount(name.to_string()));
        };
        let declared = match count.parse::<usize>() {
            Ok(declared) if declared > 0 => declared,
            _ => {
                return Err(ChunkError::InvalidCount {
                    name: name.to_string(),
                    value: count.to_string(),
                })
            }
        };

        let dense = indexed.len() == declared && indexed.keys().copied().eq(0..declared);
        if !dense {
            return Err(ChunkError::Incomplete {
                name: name.to_string(),
                declared,
                found: indexed.keys().copied().collect(),
            });
        }

        Ok(Some(Self {
            name: name.to_string(),
            segments: indexed.into_values().map(ToString::to_string).collect(),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.segments.len() > 1
    }

    /// Concatenate the segments back into the original payload
    #[must_use]
    pub fn join(&self) -> String {
        self.segments.concat()
    }

    /// Cookie name and value pairs to write, including the count sibling
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        if !self.is_chunked() {
            return vec![(self.name.clone(), self.join())];
        }

        let mut entries: Vec<(String, String)> = self
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| (Self::chunk_name(&self.name, index), segment.clone()))
            .collect();
        entries.push((Self::count_name(&self.name), self.segments.len().to_string()));
        entries
    }

    /// Names of every cookie this set writes
    #[must_use]
    pub fn cookie_names(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }

    #[must_use]
    pub fn chunk_name(name: &str, index: usize) -> String {
        format!("{name}.{index}")
    }

    #[must_use]
    pub fn count_name(name: &str) -> String {
        format!("{name}.{COUNT_SUFFIX}")
    }

    /// Whether `cookie_name` is the base cookie, its count, or one of its chunks
    #[must_use]
    pub fn belongs_to(name: &str, cookie_name: &str) -> bool {
        cookie_name == name
            || cookie_name == Self::count_name(name)
            || Self::chunk_index(name, cookie_name).is_some()
    }

    fn chunk_index(name: &str, cookie_name: &str) -> Option<usize> {
        cookie_name
            .strip_prefix(name)?
            .strip_prefix('.')?
            .parse::<usize>()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_pairs(entries: &[(String, String)]) -> Vec<(&str, &str)> {
        entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    #[test]
    fn test_small_payload_is_not_chunked() {
        let set = CookieChunkSet::split("appSession", "abc", 10);
        assert!(!set.is_chunked());
        assert_eq!(set.entries(), vec![("appSession".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_payload_at_limit_is_not_chunked() {
        let set = CookieChunkSet::split("appSession", "abcdefghij", 10);
        assert!(!set.is_chunked());
    }

    #[test]
    fn test_large_payload_is_chunked() {
        let payload = "x".repeat(25);
        let set = CookieChunkSet::split("appSession", &payload, 10);
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.cookie_names(),
            vec!["appSession.0", "appSession.1", "appSession.2", "appSession.count"]
        );
        assert_eq!(set.join(), payload);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let payload = "ééééé";
        let set = CookieChunkSet::split("s", payload, 3);
        assert!(set.is_chunked());
        assert_eq!(set.join(), payload);
    }

    #[test]
    fn test_reassemble_from_cookies() {
        let payload = "0123456789abcdefghij-tail";
        let set = CookieChunkSet::split("appSession", payload, 10);
        let mut entries = set.entries();
        entries.reverse();
        entries.push(("unrelated".to_string(), "value".to_string()));

        let read = CookieChunkSet::from_cookies("appSession", as_pairs(&entries))
            .unwrap()
            .unwrap();
        assert_eq!(read.join(), payload);
        assert_eq!(read, set);
    }

    #[test]
    fn test_no_cookie_reads_as_none() {
        let entries = vec![("foo".to_string(), "bar".to_string())];
        assert_eq!(
            CookieChunkSet::from_cookies("appSession", as_pairs(&entries)),
            Ok(None)
        );
    }

    #[test]
    fn test_missing_any_chunk_fails_closed() {
        let set = CookieChunkSet::split("appSession", &"y".repeat(30), 10);
        let entries = set.entries();
        for skipped in 0..set.len() {
            let partial: Vec<(String, String)> = entries
                .iter()
                .filter(|(name, _)| *name != CookieChunkSet::chunk_name("appSession", skipped))
                .cloned()
                .collect();
            assert!(matches!(
                CookieChunkSet::from_cookies("appSession", as_pairs(&partial)),
                Err(ChunkError::Incomplete { .. })
            ));
        }
    }

    #[test]
    fn test_extra_chunk_beyond_count_fails_closed() {
        let entries = vec![
            ("s.0".to_string(), "a".to_string()),
            ("s.1".to_string(), "b".to_string()),
            ("s.2".to_string(), "stale".to_string()),
            ("s.count".to_string(), "2".to_string()),
        ];
        assert!(matches!(
            CookieChunkSet::from_cookies("s", as_pairs(&entries)),
            Err(ChunkError::Incomplete { declared: 2, .. })
        ));
    }

    #[test]
    fn test_chunks_without_count_fail_closed() {
        let entries = vec![
            ("s.0".to_string(), "a".to_string()),
            ("s.1".to_string(), "b".to_string()),
        ];
        assert_eq!(
            CookieChunkSet::from_cookies("s", as_pairs(&entries)),
            Err(ChunkError::MissingCount("s".to_string()))
        );
    }

    #[test]
    fn test_invalid_count() {
        let entries = vec![
            ("s.0".to_string(), "a".to_string()),
            ("s.count".to_string(), "zero".to_string()),
        ];
        assert!(matches!(
            CookieChunkSet::from_cookies("s", as_pairs(&entries)),
            Err(ChunkError::InvalidCount { .. })
        ));
    }

    #[test]
    fn test_belongs_to() {
        assert!(CookieChunkSet::belongs_to("appSession", "appSession"));
        assert!(CookieChunkSet::belongs_to("appSession", "appSession.3"));
        assert!(CookieChunkSet::belongs_to("appSession", "appSession.count"));
        assert!(!CookieChunkSet::belongs_to("appSession", "appSessionX"));
        assert!(!CookieChunkSet::belongs_to("appSession", "appSession.x"));
        assert!(!CookieChunkSet::belongs_to("appSession", "foo"));
    }
}

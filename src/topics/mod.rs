//! # Topic Hierarchy
//!
//! In-memory index of every topic seen on the broker. Topics are split on `/`
//! into segments and stored as a forest of [`TopicNode`]s, each holding a
//! bounded history of payloads.
//!
//! ```text
//! topics/
//! ├── node.rs    - TopicNode and the history bound
//! ├── store.rs   - TopicStore, the forest of roots
//! ├── filter.rs  - client-side prefix filter
//! └── export.rs  - one-shot dump of the tree to disk
//! ```
//!
//! Segments are never cleaned up: a leading `/` or a `//` produces an
//! empty-named segment, so `"/a"` lives under a root called `""`.
//!
//! The tree only grows. Nodes for topics that stopped receiving traffic are
//! kept for the lifetime of the process, so a long running explorer against a
//! broker with churning topic names grows without bound (message counts per
//! node stay bounded by the history limit).

pub mod export;
pub mod filter;
pub mod node;
pub mod store;

pub use filter::TopicFilter;
pub use node::{HistoryLimit, TopicNode};
pub use store::TopicStore;

use std::fmt;

/// Topic level separator
pub const SEPARATOR: char = '/';

/// A non-empty sequence of topic segments.
///
/// Parsing never fails: the empty string is the single empty segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicPath {
    segments: Vec<String>,
}

impl TopicPath {
    pub fn parse(topic: &str) -> Self {
        Self {
            segments: topic.split(SEPARATOR).map(str::to_owned).collect(),
        }
    }

    /// Builds a path from already split segments; `None` when there are none.
    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    /// Number of segments, at least one
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl From<&str> for TopicPath {
    fn from(topic: &str) -> Self {
        Self::parse(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_empty_segments() {
        assert_eq!(TopicPath::parse("/a").segments(), ["", "a"]);
        assert_eq!(TopicPath::parse("a//b").segments(), ["a", "", "b"]);
        assert_eq!(TopicPath::parse("a/").segments(), ["a", ""]);
        assert_eq!(TopicPath::parse("").segments(), [""]);
    }

    #[test]
    fn display_reconstructs_topic() {
        for topic in ["sensors/kitchen/temp", "/leading", "a//b", "", "single"] {
            assert_eq!(TopicPath::parse(topic).to_string(), topic);
        }
    }

    #[test]
    fn from_segments_rejects_empty_sequence() {
        assert!(TopicPath::from_segments(Vec::<String>::new()).is_none());
        let path = TopicPath::from_segments(["a", "b"]).unwrap();
        assert_eq!(path.first(), "a");
        assert_eq!(path.depth(), 2);
    }
}

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Maximum number of payloads retained per topic.
///
/// Built from the user facing integer setting where zero or a negative value
/// means "keep everything".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryLimit(Option<NonZeroUsize>);

impl HistoryLimit {
    pub const UNBOUNDED: HistoryLimit = HistoryLimit(None);

    pub fn new(max: i64) -> Self {
        if max <= 0 {
            Self::UNBOUNDED
        } else {
            Self(NonZeroUsize::new(usize::try_from(max).unwrap_or(usize::MAX)))
        }
    }

    pub fn get(self) -> Option<usize> {
        self.0.map(NonZeroUsize::get)
    }

    pub fn is_unbounded(self) -> bool {
        self.0.is_none()
    }

    /// Evicts from the front until the history fits.
    fn apply<T>(self, history: &mut VecDeque<T>) {
        if let Some(max) = self.get() {
            while history.len() > max {
                history.pop_front();
            }
        }
    }
}

impl Default for HistoryLimit {
    fn default() -> Self {
        Self::new(1)
    }
}

impl From<i64> for HistoryLimit {
    fn from(max: i64) -> Self {
        Self::new(max)
    }
}

/// One segment of the topic hierarchy.
///
/// Owns its children and its payload history. Children keep insertion order
/// and sibling names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNode {
    name: String,
    children: Vec<TopicNode>,
    history: VecDeque<Vec<u8>>,
}

impl TopicNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            history: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[TopicNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&TopicNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut TopicNode> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// Returns the child called `name`, appending a new one if missing.
    pub fn child_or_insert(&mut self, name: &str) -> &mut TopicNode {
        let index = match self.children.iter().position(|child| child.name == name) {
            Some(index) => index,
            None => {
                self.children.push(TopicNode::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Appends a payload and evicts the oldest entries beyond `limit`.
    pub fn append_message(&mut self, payload: Vec<u8>, limit: HistoryLimit) {
        self.history.push_back(payload);
        limit.apply(&mut self.history);
    }

    /// History oldest first, after re-applying `limit`.
    ///
    /// The limit may have been lowered since the last append, so the
    /// eviction runs here as well.
    pub fn messages(&mut self, limit: HistoryLimit) -> impl Iterator<Item = &[u8]> {
        limit.apply(&mut self.history);
        self.history.iter().map(Vec::as_slice)
    }

    pub fn last_message(&self) -> Option<&[u8]> {
        self.history.back().map(Vec::as_slice)
    }

    /// Number of stored payloads, without re-applying any limit
    pub fn stored_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

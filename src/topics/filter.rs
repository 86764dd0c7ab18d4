use super::SEPARATOR;

/// Client-side accept filter for inbound topics.
///
/// Purely local: the wire subscription always stays on every topic. The
/// filter is compared literally segment by segment, so `+` and `#` carry no
/// wildcard meaning here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn matches(&self, topic: &str) -> bool {
        matches(&self.0, topic)
    }
}

/// True when `filter` is empty or is a segment-wise prefix of `topic`.
pub fn matches(filter: &str, topic: &str) -> bool {
    if filter.is_empty() {
        return true;
    }

    let mut topic_segments = topic.split(SEPARATOR);
    filter
        .split(SEPARATOR)
        .all(|expected| topic_segments.next() == Some(expected))
}

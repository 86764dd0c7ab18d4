use super::{TopicNode, TopicPath};

/// Forest of topic roots, one per distinct first segment.
///
/// Nodes hold no reference to their parent; full paths are rebuilt top-down
/// while walking from the roots.
#[derive(Debug, Default, Clone)]
pub struct TopicStore {
    roots: Vec<TopicNode>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[TopicNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Walks to the node at `path`, creating every missing node on the way.
    pub fn resolve_or_create(&mut self, path: &TopicPath) -> &mut TopicNode {
        let index = match self.roots.iter().position(|root| root.name() == path.first()) {
            Some(index) => index,
            None => {
                self.roots.push(TopicNode::new(path.first()));
                self.roots.len() - 1
            }
        };

        path.segments()[1..]
            .iter()
            .fold(&mut self.roots[index], |node, segment| {
                node.child_or_insert(segment)
            })
    }

    /// Pure lookup; a missing node is `None`, nothing gets created.
    pub fn find(&self, path: &TopicPath) -> Option<&TopicNode> {
        let root = self.roots.iter().find(|root| root.name() == path.first())?;
        path.segments()[1..]
            .iter()
            .try_fold(root, |node, segment| node.child(segment))
    }

    pub fn find_mut(&mut self, path: &TopicPath) -> Option<&mut TopicNode> {
        let root = self
            .roots
            .iter_mut()
            .find(|root| root.name() == path.first())?;
        path.segments()[1..]
            .iter()
            .try_fold(root, |node, segment| node.child_mut(segment))
    }

    /// Visits every node depth-first, parents before children, in insertion
    /// order. The visitor gets the segment path from the root to the node.
    pub fn for_each_node<F>(&self, mut visitor: F)
    where
        F: FnMut(&[&str], &TopicNode),
    {
        let mut path = Vec::new();
        for root in &self.roots {
            visit(root, &mut path, &mut visitor);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.for_each_node(|_, _| count += 1);
        count
    }
}

fn visit<'a, F>(node: &'a TopicNode, path: &mut Vec<&'a str>, visitor: &mut F)
where
    F: FnMut(&[&str], &TopicNode),
{
    path.push(node.name());
    visitor(path.as_slice(), node);
    for child in node.children() {
        visit(child, path, visitor);
    }
    path.pop();
}

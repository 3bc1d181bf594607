use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::MetricStatus;

/// Identifies a directory in the metric tree by its dotted path.
///
/// Directory paths end with a dot (`"one_min.host."`); the root is the empty path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricDir(String);

impl MetricDir {
    /// The root directory of the tree.
    pub const ROOT: MetricDir = MetricDir(String::new());

    /// Creates a MetricDir from a dotted path
    pub fn new(path: impl Into<String>) -> Self {
        MetricDir(path.into())
    }

    /// Returns the dotted path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the root directory
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of path segments below the root
    pub fn level(&self) -> usize {
        self.0.matches('.').count()
    }

    /// Returns the parent directory, or None for the root
    pub fn parent(&self) -> Option<MetricDir> {
        if self.is_root() {
            return None;
        }
        let trimmed = self.0.strip_suffix('.').unwrap_or(&self.0);
        match trimmed.rfind('.') {
            Some(pos) => Some(MetricDir(trimmed[..=pos].to_string())),
            None => Some(MetricDir::ROOT),
        }
    }

    /// Returns the sub-directory with the given name
    pub fn child(&self, name: &str) -> MetricDir {
        MetricDir(format!("{}{}.", self.0, name))
    }
}

impl fmt::Display for MetricDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A single child of a directory with its status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Segment name, without the trailing dot
    pub name: String,
    /// Current status of the child
    pub status: MetricStatus,
}

impl ChildEntry {
    /// Creates a child entry
    pub fn new(name: impl Into<String>, status: MetricStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Immediate children of one directory, as resolved by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirContent {
    /// Sub-directories
    pub dirs: Vec<ChildEntry>,
    /// Leaf metrics
    pub metrics: Vec<ChildEntry>,
}

impl DirContent {
    /// Creates content from sub-directories and metrics
    pub fn new(dirs: Vec<ChildEntry>, metrics: Vec<ChildEntry>) -> Self {
        Self { dirs, metrics }
    }

    /// Content of a directory with no children
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the directory has no children at all
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.metrics.is_empty()
    }

    /// Total number of children
    pub fn len(&self) -> usize {
        self.dirs.len() + self.metrics.len()
    }

    /// Sub-directories that search may return
    pub fn visible_dirs(&self) -> impl Iterator<Item = &ChildEntry> {
        self.dirs.iter().filter(|e| e.status.visible())
    }

    /// Metrics that search may return
    pub fn visible_metrics(&self) -> impl Iterator<Item = &ChildEntry> {
        self.metrics.iter().filter(|e| e.status.visible())
    }

    /// True when the directory has children and none of them is visible.
    ///
    /// An empty directory is not considered hidden.
    pub fn all_hidden(&self) -> bool {
        !self.is_empty()
            && self.visible_dirs().next().is_none()
            && self.visible_metrics().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_chain() {
        let dir = MetricDir::new("one_min.host.cpu.");
        assert_eq!(dir.level(), 3);
        let parent = dir.parent().unwrap();
        assert_eq!(parent.as_str(), "one_min.host.");
        let grand = parent.parent().unwrap();
        assert_eq!(grand.as_str(), "one_min.");
        let root = grand.parent().unwrap();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_child() {
        let dir = MetricDir::ROOT.child("one_min").child("host");
        assert_eq!(dir.as_str(), "one_min.host.");
        assert_eq!(dir.to_string(), "one_min.host.");
        assert_eq!(MetricDir::ROOT.to_string(), "<root>");
    }

    #[test]
    fn test_visible_children() {
        let content = DirContent::new(
            vec![
                ChildEntry::new("a", MetricStatus::Simple),
                ChildEntry::new("b", MetricStatus::Ban),
            ],
            vec![
                ChildEntry::new("m1", MetricStatus::AutoHidden),
                ChildEntry::new("m2", MetricStatus::Approved),
            ],
        );
        assert_eq!(content.len(), 4);
        let dirs: Vec<&str> = content.visible_dirs().map(|e| e.name.as_str()).collect();
        assert_eq!(dirs, vec!["a"]);
        let metrics: Vec<&str> = content.visible_metrics().map(|e| e.name.as_str()).collect();
        assert_eq!(metrics, vec!["m2"]);
        assert!(!content.all_hidden());
    }

    #[test]
    fn test_all_hidden() {
        assert!(!DirContent::empty().all_hidden());
        let content = DirContent::new(
            vec![ChildEntry::new("a", MetricStatus::Hidden)],
            vec![ChildEntry::new("m", MetricStatus::AutoHidden)],
        );
        assert!(content.all_hidden());
    }
}

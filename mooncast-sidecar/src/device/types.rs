use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Index of a node inside the snapshot that produced it.
///
/// A `NodeId` is only meaningful together with its `UiSnapshot`; ids from
/// different snapshots must never be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Bounding rectangle in screen pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl UiRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Width divided by height, `None` for degenerate rectangles
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.width() as f64 / self.height() as f64)
        }
    }
}

impl std::fmt::Display for UiRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// State flags reported by the accessibility layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeFlags {
    pub clickable: bool,
    pub enabled: bool,
    pub visible: bool,
    pub focusable: bool,
    pub focused: bool,
    pub editable: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            clickable: false,
            enabled: true,
            visible: true,
            focusable: false,
            focused: false,
            editable: false,
        }
    }
}

/// A single UI element as captured in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiNode {
    /// Widget class, e.g. `android.widget.Button`
    pub class_name: String,
    /// Visible text
    pub text: Option<String>,
    /// Accessible description (content description)
    pub description: Option<String>,
    /// View resource id if exposed
    pub resource_id: Option<String>,
    /// Owning application package
    pub package: Option<String>,
    /// Bounds in screen coordinates
    pub bounds: UiRect,
    pub flags: NodeFlags,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl UiNode {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            text: None,
            description: None,
            resource_id: None,
            package: None,
            bounds: UiRect::default(),
            flags: NodeFlags::default(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Short class name without the package prefix (`Button` for `android.widget.Button`)
    pub fn short_class(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.class_name)
    }

    /// Own text, falling back to the description
    pub fn label(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.description.as_deref().filter(|d| !d.is_empty()))
    }
}

/// Kind of foreground notification raised by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundEventKind {
    WindowChanged,
    ContentChanged,
}

/// "Foreground UI changed" notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForegroundEvent {
    /// Package of the app that raised the event
    pub package: String,
    pub kind: ForegroundEventKind,
    pub at: DateTime<Utc>,
}

impl ForegroundEvent {
    pub fn new(package: impl Into<String>, kind: ForegroundEventKind) -> Self {
        Self {
            package: package.into(),
            kind,
            at: Utc::now(),
        }
    }
}

/// Actions that can be performed on a snapshot node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum NodeAction {
    Click,
    Focus,
    SetText(String),
    SelectAll,
}

impl std::fmt::Display for NodeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeAction::Click => write!(f, "click"),
            NodeAction::Focus => write!(f, "focus"),
            NodeAction::SetText(_) => write!(f, "set_text"),
            NodeAction::SelectAll => write!(f, "select_all"),
        }
    }
}

/// Point-in-time, read-only UI element tree.
///
/// Nodes live in an arena owned by the snapshot; parent and child links are
/// indices into that arena. A snapshot is discarded after use and a fresh one
/// is requested after every UI-mutating action.
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    package: Option<String>,
    nodes: Vec<UiNode>,
}

impl UiSnapshot {
    pub fn new(package: Option<String>) -> Self {
        Self {
            package,
            nodes: Vec::new(),
        }
    }

    /// Build a snapshot from a declarative tree
    pub fn from_spec(package: impl Into<String>, root: NodeSpec) -> Self {
        let package = package.into();
        let mut snapshot = Self::new(Some(package.clone()));
        snapshot.insert_spec(None, root, &package);
        snapshot
    }

    fn insert_spec(&mut self, parent: Option<NodeId>, spec: NodeSpec, package: &str) {
        let mut node = spec.node;
        if node.package.is_none() {
            node.package = Some(package.to_string());
        }
        let id = self.push(parent, node);
        for child in spec.children {
            self.insert_spec(Some(id), child, package);
        }
    }

    /// Append a node under `parent` (or as a root) and return its id
    pub fn push(&mut self, parent: Option<NodeId>, mut node: UiNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent.filter(|p| p.0 < self.nodes.len());
        node.children.clear();
        if let Some(p) = node.parent {
            self.nodes[p.0].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn set_package(&mut self, package: Option<String>) {
        self.package = package;
    }

    /// Foreground package identity of the window this snapshot was taken from
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { snapshot: self, id })
    }

    /// First root node
    pub fn root(&self) -> Option<NodeRef<'_>> {
        self.roots().next()
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(move |(i, _)| NodeRef {
                snapshot: self,
                id: NodeId(i),
            })
    }

    /// All nodes in document (pre-order traversal) order
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        for root in self.roots() {
            ordered.push(root);
            ordered.extend(root.descendants());
        }
        ordered.into_iter()
    }

    /// Clickable nodes in document order
    pub fn clickable_nodes(&self) -> Vec<NodeRef<'_>> {
        self.iter().filter(|n| n.flags.clickable).collect()
    }

    /// Stable hash of the visible structure, used to detect UI changes
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.package.hash(&mut hasher);
        for node in self.iter() {
            node.class_name.hash(&mut hasher);
            node.text.hash(&mut hasher);
            node.description.hash(&mut hasher);
            node.bounds.hash(&mut hasher);
            node.flags.clickable.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Borrowed navigation handle into a snapshot
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    snapshot: &'a UiSnapshot,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn snapshot(&self) -> &'a UiSnapshot {
        self.snapshot
    }

    pub fn node(&self) -> &'a UiNode {
        &self.snapshot.nodes[self.id.0]
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.node().parent.map(|id| NodeRef {
            snapshot: self.snapshot,
            id,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let snapshot = self.snapshot;
        self.node()
            .children
            .iter()
            .map(move |&id| NodeRef { snapshot, id })
    }

    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    /// Descendants in pre-order, excluding `self`
    pub fn descendants(&self) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef<'a>> = self.children().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut children: Vec<NodeRef<'a>> = node.children().collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Other children of the same parent, in order
    pub fn siblings(&self) -> Vec<NodeRef<'a>> {
        match self.parent() {
            Some(parent) => parent.children().filter(|c| c.id != self.id).collect(),
            None => Vec::new(),
        }
    }

    /// Ancestors from the parent upwards, at most `max_depth` levels
    pub fn ancestors(&self, max_depth: usize) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            if out.len() >= max_depth {
                break;
            }
            out.push(node);
            current = node.parent();
        }
        out
    }

    /// Own text and description followed by every descendant's, space separated
    pub fn subtree_text(&self) -> String {
        let mut parts: Vec<&'a str> = Vec::new();
        push_labels(self.node(), &mut parts);
        for d in self.descendants() {
            push_labels(d.node(), &mut parts);
        }
        parts.join(" ")
    }

    /// True when neither the node nor any descendant carries text or a description
    pub fn is_text_free(&self) -> bool {
        self.subtree_text().is_empty()
    }
}

fn push_labels<'n>(node: &'n UiNode, parts: &mut Vec<&'n str>) {
    for value in [node.text.as_deref(), node.description.as_deref()]
        .into_iter()
        .flatten()
    {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
}

impl<'a> Deref for NodeRef<'a> {
    type Target = UiNode;

    fn deref(&self) -> &Self::Target {
        self.node()
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id.0)
            .field("class", &self.node().short_class())
            .field("text", &self.node().text)
            .field("desc", &self.node().description)
            .finish()
    }
}

/// Declarative node description used to assemble snapshots
#[derive(Debug, Clone)]
pub struct NodeSpec {
    node: UiNode,
    children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            node: UiNode::new(class_name),
            children: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.node.text = Some(text.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.node.description = Some(description.into());
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.node.resource_id = Some(id.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.node.package = Some(package.into());
        self
    }

    pub fn bounds(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.node.bounds = UiRect::new(left, top, right, bottom);
        self
    }

    pub fn clickable(mut self) -> Self {
        self.node.flags.clickable = true;
        self
    }

    pub fn focusable(mut self) -> Self {
        self.node.flags.focusable = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.node.flags.editable = true;
        self.node.flags.focusable = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.node.flags.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.node.flags.visible = false;
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UiSnapshot {
        UiSnapshot::from_spec(
            "com.example",
            NodeSpec::new("android.widget.FrameLayout").children([
                NodeSpec::new("android.widget.LinearLayout")
                    .clickable()
                    .child(NodeSpec::new("android.widget.TextView").text("First"))
                    .child(NodeSpec::new("android.widget.TextView").description("Second")),
                NodeSpec::new("android.widget.Button").text("OK").clickable(),
            ]),
        )
    }

    #[test]
    fn test_rect_geometry() {
        let rect = UiRect::new(100, 200, 150, 230);
        assert_eq!(rect.width(), 50);
        assert_eq!(rect.height(), 30);
        assert_eq!(rect.center(), (125, 215));
        assert!(!rect.is_empty());
        assert!(UiRect::default().aspect_ratio().is_none());
        assert_eq!(rect.to_string(), "[100,200][150,230]");
    }

    #[test]
    fn test_document_order() {
        let snapshot = sample();
        let classes: Vec<&str> = snapshot.iter().map(|n| n.node().short_class()).collect();
        assert_eq!(
            classes,
            vec!["FrameLayout", "LinearLayout", "TextView", "TextView", "Button"]
        );
        assert_eq!(snapshot.clickable_nodes().len(), 2);
    }

    #[test]
    fn test_navigation() {
        let snapshot = sample();
        let label = snapshot
            .iter()
            .find(|n| n.text.as_deref() == Some("First"))
            .unwrap();
        let parent = label.parent().unwrap();
        assert_eq!(parent.short_class(), "LinearLayout");
        assert_eq!(label.siblings().len(), 1);
        assert_eq!(label.ancestors(5).len(), 2);
        assert_eq!(label.ancestors(1).len(), 1);
        assert_eq!(parent.subtree_text(), "First Second");
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let a = sample();
        let b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = UiSnapshot::from_spec(
            "com.example",
            NodeSpec::new("android.widget.FrameLayout")
                .child(NodeSpec::new("android.widget.Button").text("Cancel").clickable()),
        );
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_text_free_detection() {
        let snapshot = UiSnapshot::from_spec(
            "com.example",
            NodeSpec::new("android.widget.FrameLayout")
                .child(NodeSpec::new("android.widget.ImageButton").clickable()),
        );
        let button = snapshot.clickable_nodes()[0];
        assert!(button.is_text_free());
        assert_eq!(button.label(), None);
    }
}

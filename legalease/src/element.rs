use crate::errors::LegalEaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Helper function for clean serialization
fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

/// Text-bearing attributes a host element exposes
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UIElementAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub title: Option<String>,
    /// Value or text content of the element
    #[serde(default, alias = "text", skip_serializing_if = "is_empty_string")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub placeholder: Option<String>,
}

impl UIElementAttributes {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Concatenates the non-empty text attributes in the order value, title,
    /// description, help, placeholder, separated by single spaces.
    pub fn text_content(&self) -> String {
        [
            &self.value,
            &self.title,
            &self.description,
            &self.help,
            &self.placeholder,
        ]
        .into_iter()
        .filter_map(|attr| attr.as_deref())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl fmt::Debug for UIElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElementAttributes");

        if !self.role.is_empty() {
            debug_struct.field("role", &self.role);
        }

        // Only show non-empty text attributes
        for (label, attr) in [
            ("title", &self.title),
            ("value", &self.value),
            ("description", &self.description),
            ("help", &self.help),
            ("placeholder", &self.placeholder),
        ] {
            if let Some(text) = attr.as_deref() {
                if !text.is_empty() {
                    debug_struct.field(label, &text);
                }
            }
        }

        debug_struct.finish()
    }
}

/// Host-side element handle.
///
/// Implementations wrap whatever the host environment hands out (a COM
/// pointer, an AX reference, a node info object). Dropping the boxed
/// implementation must release the underlying host resource.
pub trait UIElementImpl: Send + Sync + Debug {
    /// Stable identity within one tree snapshot, if the host provides one
    fn id(&self) -> Option<String>;
    fn role(&self) -> String;
    fn attributes(&self) -> UIElementAttributes;
    fn children(&self) -> Result<Vec<UIElement>, LegalEaseError>;
    /// Secondary "visible children" collection some hosts expose in
    /// addition to the primary one
    fn visible_children(&self) -> Result<Vec<UIElement>, LegalEaseError> {
        Ok(Vec::new())
    }
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

/// Represents a UI element in the host's tree
#[derive(Debug)]
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

impl UIElement {
    /// Create a new UI element from a host-specific implementation
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn attributes(&self) -> UIElementAttributes {
        self.inner.attributes()
    }

    pub fn children(&self) -> Result<Vec<UIElement>, LegalEaseError> {
        self.inner.children()
    }

    pub fn visible_children(&self) -> Result<Vec<UIElement>, LegalEaseError> {
        self.inner.visible_children()
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

/// Serializable snapshot of a host tree.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct UINode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: UIElementAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UINode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visible_children: Vec<UINode>,
}

impl UINode {
    pub fn new(attributes: UIElementAttributes) -> Self {
        Self {
            attributes,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_child(mut self, child: UINode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = UINode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_visible_child(mut self, child: UINode) -> Self {
        self.visible_children.push(child);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Wrap the snapshot so it can be walked like a live host tree
    pub fn into_element(self) -> UIElement {
        SnapshotElement::root(Arc::new(self))
    }

    /// Element view over a snapshot that stays shared with other readers
    pub fn shared_element(tree: &Arc<UINode>) -> UIElement {
        SnapshotElement::root(Arc::clone(tree))
    }

    fn fmt_bounded(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let mut node = f.debug_struct("UINode");
        if let Some(id) = &self.id {
            node.field("id", id);
        }
        node.field("attributes", &self.attributes);
        for (name, nodes) in [
            ("children", &self.children),
            ("visible_children", &self.visible_children),
        ] {
            if nodes.is_empty() {
                continue;
            }
            if depth < DEBUG_DEPTH_LIMIT {
                node.field(name, &BoundedNodes { nodes, depth });
            } else {
                node.field(name, &format!("[{} nodes, depth limit reached]", nodes.len()));
            }
        }
        node.finish()
    }
}

const DEBUG_DEPTH_LIMIT: usize = 20;

impl fmt::Debug for UINode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_bounded(f, 0)
    }
}

/// Child list printed one level deeper than its parent
struct BoundedNodes<'a> {
    nodes: &'a [UINode],
    depth: usize,
}

impl fmt::Debug for BoundedNodes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|node| BoundedNode {
                node,
                depth: self.depth + 1,
            }))
            .finish()
    }
}

struct BoundedNode<'a> {
    node: &'a UINode,
    depth: usize,
}

impl fmt::Debug for BoundedNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt_bounded(f, self.depth)
    }
}

#[derive(Debug, Clone, Copy)]
enum ChildSlot {
    Primary(usize),
    Visible(usize),
}

/// Element handle into a shared `UINode` snapshot, addressed by path.
#[derive(Clone)]
struct SnapshotElement {
    tree: Arc<UINode>,
    path: Vec<ChildSlot>,
}

impl SnapshotElement {
    fn root(tree: Arc<UINode>) -> UIElement {
        UIElement::new(Box::new(Self {
            tree,
            path: Vec::new(),
        }))
    }

    fn node(&self) -> &UINode {
        let mut node: &UINode = &self.tree;
        for slot in &self.path {
            // Paths are only built from indices that existed in the same
            // immutable snapshot.
            node = match *slot {
                ChildSlot::Primary(i) => &node.children[i],
                ChildSlot::Visible(i) => &node.visible_children[i],
            };
        }
        node
    }

    fn child(&self, slot: ChildSlot) -> UIElement {
        let mut path = self.path.clone();
        path.push(slot);
        UIElement::new(Box::new(Self {
            tree: Arc::clone(&self.tree),
            path,
        }))
    }
}

impl fmt::Debug for SnapshotElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotElement")
            .field("path", &self.path)
            .field("attributes", &self.node().attributes)
            .finish()
    }
}

impl UIElementImpl for SnapshotElement {
    fn id(&self) -> Option<String> {
        self.node().id.clone()
    }

    fn role(&self) -> String {
        self.node().attributes.role.clone()
    }

    fn attributes(&self) -> UIElementAttributes {
        self.node().attributes.clone()
    }

    fn children(&self) -> Result<Vec<UIElement>, LegalEaseError> {
        Ok((0..self.node().children.len())
            .map(|i| self.child(ChildSlot::Primary(i)))
            .collect())
    }

    fn visible_children(&self) -> Result<Vec<UIElement>, LegalEaseError> {
        Ok((0..self.node().visible_children.len())
            .map(|i| self.child(ChildSlot::Visible(i)))
            .collect())
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

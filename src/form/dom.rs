//! The element tree the editing engine operates on
//!
//! The engine originally runs against a browser DOM; this module models that
//! substrate explicitly as an arena-held element tree which is the single
//! source of truth for form state. The navigation tree is a derived projection
//! of it, never the reverse.
//!
//! Markup conventions (mirrored by the test fixtures):
//!
//!     - Every structural element carries its path identifier in `id`; form
//!       fields carry it in `name` as well.
//!     - An optional block is a `container` element preceded by its add
//!       control (`btn-add`, hidden while the block is present); its delete
//!       control points back at it through `data-target="#<id>"`.
//!     - A list is a `list-container` whose children alternate add control
//!       and item; a locally-growing list additionally holds a
//!       `growing-source` template child whose own id is the bare list prefix
//!       and whose descendants are numbered `<prefix>:0:...`.
//!     - A choice group is a `conditional-container`: a `conditional`
//!       selector followed by mutually exclusive `conditional-option` blocks,
//!       each carrying its selector value as a class token.
//!     - A collapsible panel inside a block has id `collapse-<block id>` and
//!       is referenced by an anchor whose `href` holds the escaped id behind
//!       `#collapse-`.

use crate::form::error::{EditError, EditResult};

/// Arena index of an element. Stable for the lifetime of the document;
/// detached elements keep their id and can be re-attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Structural role of an element, derived once from its tag and class tokens
/// instead of being re-parsed ad hoc at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    LeafField,
    ListItem,
    ListTemplate,
    OptionalBlock,
    ChoiceOption,
    ChoiceSelector,
    AddControl,
    DeleteControl,
    Other,
}

const ADD_CLASSES: &[&str] = &["btn-add", "add-button", "growing-add-button"];
const DELETE_CLASSES: &[&str] = &[
    "btn-delete",
    "delete-button",
    "growing-delete-button",
    "fieldset-delete-button",
    "growing-fieldset-delete-button",
];

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &["input", "br", "hr", "img", "meta", "link"];

#[derive(Debug, Clone)]
pub(crate) enum Child {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<NodeId>,
    role: Role,
}

/// An arena-held element tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Document {
    /// An empty document with a bare `div` root.
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = doc.create_element("div");
        doc.root = root;
        doc
    }

    /// Parse a whole document from markup. A single top-level element becomes
    /// the root; several top-level elements get a synthetic `div` wrapper.
    pub fn parse(markup: &str) -> EditResult<Self> {
        let mut doc = Document::new();
        let roots = crate::form::fragment::parse_into(&mut doc, markup)?;
        if roots.len() == 1 {
            doc.root = roots[0];
        } else {
            let wrapper = doc.root;
            for &r in &roots {
                doc.append_child(wrapper, r);
            }
        }
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
            role: Role::Other,
        });
        self.refresh_role(id);
        id
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn role(&self, node: NodeId) -> Role {
        self.nodes[node.0].role
    }

    // ------------------------------------------------------------------
    // Attributes and class tokens
    // ------------------------------------------------------------------

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `id` attribute, the element's path identifier.
    pub fn id_attr(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "id")
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let data = &mut self.nodes[node.0];
        if let Some(entry) = data.attrs.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            data.attrs.push((name.to_string(), value.to_string()));
        }
        if name == "class" {
            self.refresh_role(node);
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0].attrs.retain(|(n, _)| n != name);
        if name == "class" {
            self.refresh_role(node);
        }
    }

    /// The raw `class` attribute value, empty when absent.
    pub fn classes(&self, node: NodeId) -> &str {
        self.attr(node, "class").unwrap_or("")
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).split_whitespace().any(|c| c == class)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let current = self.classes(node);
        let value = if current.is_empty() {
            class.to_string()
        } else {
            format!("{} {}", current, class)
        };
        self.set_attr(node, "class", &value);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let value: String = self
            .classes(node)
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(node, "class", &value);
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Element children, in order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .filter_map(|c| match c {
                Child::Element(id) => Some(*id),
                Child::Text(_) => None,
            })
            .collect()
    }

    /// All elements after `node` under the same parent.
    pub fn next_siblings(&self, node: NodeId) -> Vec<NodeId> {
        match self.parent(node) {
            Some(parent) => {
                let siblings = self.children(parent);
                match siblings.iter().position(|&s| s == node) {
                    Some(pos) => siblings[pos + 1..].to_vec(),
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.next_siblings(node).first().copied()
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == node)?;
        if pos == 0 {
            None
        } else {
            Some(siblings[pos - 1])
        }
    }

    /// Preorder walk of the subtree rooted at `node`, including `node`.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current);
            for &c in children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Preorder walk of the subtree, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.subtree(node)[1..].to_vec()
    }

    /// Descendants (excluding `node`) carrying the given class token.
    pub fn descendants_with_class(&self, node: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|&d| self.has_class(d, class))
            .collect()
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.0].children.push(Child::Element(child));
        self.nodes[child.0].parent = Some(parent);
        self.refresh_role(child);
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        self.nodes[parent.0].children.push(Child::Text(text.to_string()));
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        self.detach(node);
        let parent = match self.parent(reference) {
            Some(p) => p,
            None => return,
        };
        let pos = self.raw_position(parent, reference);
        if let Some(pos) = pos {
            self.nodes[parent.0].children.insert(pos, Child::Element(node));
            self.nodes[node.0].parent = Some(parent);
            self.refresh_role(node);
        }
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        self.detach(node);
        let parent = match self.parent(reference) {
            Some(p) => p,
            None => return,
        };
        let pos = self.raw_position(parent, reference);
        if let Some(pos) = pos {
            self.nodes[parent.0]
                .children
                .insert(pos + 1, Child::Element(node));
            self.nodes[node.0].parent = Some(parent);
            self.refresh_role(node);
        }
    }

    /// Remove `node` from its parent. The subtree stays alive in the arena
    /// and can be re-attached.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.nodes[parent.0]
                .children
                .retain(|c| !matches!(c, Child::Element(id) if *id == node));
            self.nodes[node.0].parent = None;
        }
    }

    fn raw_position(&self, parent: NodeId, node: NodeId) -> Option<usize> {
        self.nodes[parent.0]
            .children
            .iter()
            .position(|c| matches!(c, Child::Element(id) if *id == node))
    }

    /// Deep copy of a subtree. The copy is detached.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let tag = self.nodes[node.0].tag.clone();
        let attrs = self.nodes[node.0].attrs.clone();
        let children = self.nodes[node.0].children.clone();
        let copy = self.create_element(&tag);
        self.nodes[copy.0].attrs = attrs;
        for child in children {
            match child {
                Child::Element(id) => {
                    let child_copy = self.clone_subtree(id);
                    self.append_child(copy, child_copy);
                }
                Child::Text(text) => self.append_text(copy, &text),
            }
        }
        self.refresh_role(copy);
        copy
    }

    /// Direct text content of the element (text children concatenated,
    /// not recursive). This is a textarea's value.
    pub fn own_text(&self, node: NodeId) -> String {
        self.nodes[node.0]
            .children
            .iter()
            .filter_map(|c| match c {
                Child::Text(t) => Some(t.as_str()),
                Child::Element(_) => None,
            })
            .collect()
    }

    pub fn set_own_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0]
            .children
            .retain(|c| matches!(c, Child::Element(_)));
        if !text.is_empty() {
            self.nodes[node.0]
                .children
                .insert(0, Child::Text(text.to_string()));
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Find the attached element with the given `id` attribute.
    ///
    /// More than one match is an [`EditError::AmbiguousLocator`]; an
    /// identifier that must be unique is never resolved by guessing. List
    /// templates are invisible to lookup: their descendants carry the same
    /// identifiers as the item cloned from them at position zero.
    pub fn find_by_id(&self, id: &str) -> EditResult<Option<NodeId>> {
        let mut found = None;
        for node in self.live_nodes() {
            if self.id_attr(node) == Some(id) {
                if found.is_some() {
                    return Err(EditError::AmbiguousLocator(format!("#{}", id)));
                }
                found = Some(node);
            }
        }
        Ok(found)
    }

    /// Attached elements outside any list template, in document order.
    fn live_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_live(self.root, &mut out);
        out
    }

    fn collect_live(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.has_class(node, "growing-source") {
            return;
        }
        out.push(node);
        for child in self.children(node) {
            self.collect_live(child, out);
        }
    }

    /// Like [`find_by_id`](Self::find_by_id) but an absent element is an
    /// [`EditError::UnresolvableLocator`].
    pub fn require_by_id(&self, id: &str) -> EditResult<NodeId> {
        self.find_by_id(id)?
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", id)))
    }

    /// Attached elements carrying the given attribute value. List templates
    /// are skipped, as in [`find_by_id`](Self::find_by_id).
    pub fn find_by_attr(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.live_nodes()
            .into_iter()
            .filter(|&n| self.attr(n, name) == Some(value))
            .collect()
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub(crate) fn refresh_role(&mut self, node: NodeId) {
        let role = self.compute_role(node);
        self.nodes[node.0].role = role;
    }

    fn compute_role(&self, node: NodeId) -> Role {
        let tag = self.tag(node);
        if self.has_class(node, "growing-source") {
            return Role::ListTemplate;
        }
        if self.has_class(node, "conditional-option") {
            return Role::ChoiceOption;
        }
        if tag == "select" && self.has_class(node, "conditional") {
            return Role::ChoiceSelector;
        }
        if ADD_CLASSES.iter().any(|c| self.has_class(node, c)) {
            return Role::AddControl;
        }
        if DELETE_CLASSES.iter().any(|c| self.has_class(node, c)) {
            return Role::DeleteControl;
        }
        if matches!(tag, "input" | "textarea" | "select") {
            return Role::LeafField;
        }
        if self.has_class(node, "container") {
            let in_list = self.parent(node).is_some_and(|p| {
                self.has_class(p, "growing-container") || self.has_class(p, "list-container")
            });
            if in_list {
                return Role::ListItem;
            }
            return Role::OptionalBlock;
        }
        Role::Other
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize an element and its subtree back to markup.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_element(node, &mut out);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[node.0].children {
            match child {
                Child::Element(id) => self.write_element(*id, &mut out),
                Child::Text(text) => out.push_str(&escape_text(text)),
            }
        }
        out
    }

    fn write_element(&self, node: NodeId, out: &mut String) {
        let data = &self.nodes[node.0];
        out.push('<');
        out.push_str(&data.tag);
        for (name, value) in &data.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if data.children.is_empty() && VOID_TAGS.contains(&data.tag.as_str()) {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&self.inner_html(node));
        out.push_str("</");
        out.push_str(&data.tag);
        out.push('>');
    }

    /// Serialize the form fields under `root` as a url-encoded payload.
    ///
    /// Every element at or under a `deleted` class and every list template
    /// (`growing-source`) is excluded, in every nesting position. This is the
    /// mechanism by which hidden optional content never reaches the document
    /// written back on submit.
    pub fn serialize_form(&self, root: NodeId) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        self.collect_fields(root, &mut pairs);
        pairs
            .iter()
            .map(|(n, v)| format!("{}={}", urlencode(n), urlencode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn collect_fields(&self, node: NodeId, pairs: &mut Vec<(String, String)>) {
        if self.has_class(node, "deleted") || self.has_class(node, "growing-source") {
            return;
        }
        if let Some(name) = self.attr(node, "name") {
            let value = match self.tag(node) {
                "input" | "select" => self.attr(node, "value").unwrap_or("").to_string(),
                "textarea" => self.own_text(node),
                _ => {
                    for child in self.children(node) {
                        self.collect_fields(child, pairs);
                    }
                    return;
                }
            };
            pairs.push((name.to_string(), value));
            return;
        }
        for child in self.children(node) {
            self.collect_fields(child, pairs);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// application/x-www-form-urlencoded encoding of one key or value.
pub(crate) fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push_str(&format!("{:02X}", byte));
            }
        }
    }
    out
}

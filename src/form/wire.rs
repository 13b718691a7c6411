//! Server contracts for add, copy and paste
//!
//! New elements are not synthesized locally: the server owns the document
//! grammar and renders both the form markup and the matching tree node for
//! anything being inserted. These are the JSON shapes of those round trips.

use serde::{Deserialize, Serialize};

use crate::form::tree::TreeNodeInfo;

/// Query parameters of an add-element request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddElementParams {
    /// Identifier of the slot being filled, e.g. `test:qcm:0`.
    pub elt_id: String,
    /// Grammar the document instance is validated against.
    pub dtd_url: String,
    /// Extra fields collected from a follow-up dialog, flattened into the
    /// query string.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl AddElementParams {
    /// Flatten into the query pairs the request carries.
    pub fn into_query(self) -> Vec<(String, String)> {
        let mut query = vec![
            ("elt_id".to_string(), self.elt_id),
            ("dtd_url".to_string(), self.dtd_url),
        ];
        query.extend(self.extra);
        query
    }
}

/// `attr` of a tree node: the rendered node's attributes, carrying its id
/// and class tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeAttr {
    pub id: String,
    #[serde(rename = "class")]
    pub classes: String,
}

/// `metadata` of a tree node: opaque data riding along with it, echoing the
/// node id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeMetadata {
    pub id: String,
}

/// A tree node as the server renders it, children included. `data` is the
/// display label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeNodeData {
    pub data: String,
    pub attr: TreeAttr,
    pub metadata: TreeMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNodeData>,
}

impl TreeNodeData {
    pub fn to_info(&self) -> TreeNodeInfo {
        TreeNodeInfo {
            id: self.attr.id.clone(),
            classes: self.attr.classes.clone(),
            label: self.data.clone(),
            children: self.children.iter().map(TreeNodeData::to_info).collect(),
        }
    }
}

/// Response to an add-element request.
///
/// `previous` lists insertion-point candidates as `[position, locator]`
/// pairs, most specific first; the first locator that resolves uniquely in
/// the tree wins. When the server needs more input before it can render the
/// element it sends `modal` instead of markup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddResponse {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub jstree_data: Option<TreeNodeData>,
    #[serde(default)]
    pub previous: Vec<(String, String)>,
    #[serde(default)]
    pub modal: Option<String>,
}

/// Response to a copy request. Copy state lives server-side so content can
/// move between documents; the client only relays the outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyResponse {
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub info_msg: Option<String>,
}

/// Response to a paste request: the rendered clipboard content plus where it
/// goes, in the same shape as an add.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasteResponse {
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub elt_id: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub jstree_data: Option<TreeNodeData>,
    #[serde(default)]
    pub previous: Vec<(String, String)>,
    /// The paste target is a choice slot, addressed through its selector
    /// instead of an add control.
    #[serde(default)]
    pub is_choice: bool,
}

/// Response carrying the rendered comment dialog for a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentModalResponse {
    pub content: String,
}

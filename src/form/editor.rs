//! Editing facade
//!
//! [`Editor`] owns the form document and wires the container state machines,
//! the renumbering engine and the tree mirror together behind one command
//! surface. The two external collaborators stay abstract: the visual tree is
//! any [`TreeWidget`], and the server that renders new elements is any
//! [`Transport`].
//!
//! Commands arrive either through the named methods or through [`EditOp`],
//! which is what an event layer dispatches from clicks, selection changes and
//! tree drags.

use log::{debug, info, warn};

use crate::form::containers::{self, ChoiceOutcome};
use crate::form::dom::{self, Document, NodeId, Role};
use crate::form::error::{EditError, EditResult};
use crate::form::fragment;
use crate::form::ident;
use crate::form::mirror::{self, Transition};
use crate::form::renumber::{is_under_prefix, Renumberer};
use crate::form::tree::{TreeNodeInfo, TreePosition, TreeWidget};
use crate::form::wire::{
    AddElementParams, AddResponse, CommentModalResponse, CopyResponse, PasteResponse,
};

/// Server seam. `get` carries query parameters, `post` a urlencoded body;
/// both return the raw response text.
pub trait Transport {
    fn get(&mut self, url: &str, params: &[(String, String)]) -> EditResult<String>;
    fn post(&mut self, url: &str, body: &str) -> EditResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Error,
}

/// A user-facing notification produced by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

/// Endpoint and policy configuration.
pub struct EditorConfig {
    pub add_element_url: String,
    pub copy_url: String,
    pub paste_url: String,
    pub comment_modal_url: String,
    /// Grammar the edited document is validated against, sent along with
    /// every server round trip.
    pub dtd_url: String,
    /// Destructive-action hook: receives the question text and returns
    /// whether to proceed. `None` proceeds unconditionally.
    pub confirm_delete: Option<Box<dyn Fn(&str) -> bool>>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            add_element_url: String::new(),
            copy_url: String::new(),
            paste_url: String::new(),
            comment_modal_url: String::new(),
            dtd_url: String::new(),
            confirm_delete: None,
        }
    }
}

/// A structural edit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    AddBlock { control: String },
    DeleteBlock { control: String },
    AddListItem { control: String },
    DeleteListItem { control: String },
    ChoiceChanged { selector: String, value: String },
    AddElement { control: String, extra: Vec<(String, String)> },
    Copy { node: String },
    Paste { node: String },
    Move { node: String, target: String, position: TreePosition },
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Done,
    /// The user declined the confirmation, nothing changed.
    Declined,
    /// The server needs more input first; `modal` is the dialog markup to
    /// show, after which the command is re-issued with the collected fields.
    NeedsInput { modal: String },
}

pub struct Editor<W: TreeWidget, T: Transport> {
    doc: Document,
    tree: W,
    transport: T,
    config: EditorConfig,
    /// Prefixes with an in-flight server request; structural edits under
    /// them are rejected until the response lands.
    busy: Vec<String>,
    transition: Transition,
    messages: Vec<Message>,
}

/// Question text for a delete confirmation, derived from the control label.
pub fn delete_question(label: &str) -> String {
    format!(
        "Are you sure you want to delete this {}",
        label.replacen("Delete ", "", 1)
    )
}

impl<W: TreeWidget, T: Transport> Editor<W, T> {
    pub fn new(doc: Document, tree: W, transport: T, config: EditorConfig) -> Self {
        Editor {
            doc,
            tree,
            transport,
            config,
            busy: Vec::new(),
            transition: Transition::new(),
            messages: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn tree(&self) -> &W {
        &self.tree
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    fn message(&mut self, kind: MessageKind, text: impl Into<String>) {
        let text = text.into();
        if kind == MessageKind::Error {
            warn!("{}", text);
        }
        self.messages.push(Message { kind, text });
    }

    /// Serialize the live form fields, the payload written back on submit.
    /// Dormant blocks and list templates never appear in it.
    pub fn submit(&self) -> String {
        self.doc.serialize_form(self.doc.root())
    }

    // ------------------------------------------------------------------
    // Busy subtrees
    // ------------------------------------------------------------------

    /// Mark a prefix as having an in-flight request.
    pub fn begin_pending(&mut self, prefix: &str) {
        self.busy.push(prefix.to_string());
    }

    pub fn finish_pending(&mut self, prefix: &str) {
        if let Some(pos) = self.busy.iter().position(|p| p == prefix) {
            self.busy.remove(pos);
        }
    }

    fn ensure_not_busy(&self, form_id: &str) -> EditResult<()> {
        for prefix in &self.busy {
            if is_under_prefix(form_id, prefix) || is_under_prefix(prefix, form_id) {
                return Err(EditError::SubtreeBusy(prefix.clone()));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command dispatch
    // ------------------------------------------------------------------

    pub fn apply(&mut self, op: EditOp) -> EditResult<EditOutcome> {
        match op {
            EditOp::AddBlock { control } => self.add_block(&control),
            EditOp::DeleteBlock { control } => self.delete_block(&control),
            EditOp::AddListItem { control } => self.add_list_item(&control),
            EditOp::DeleteListItem { control } => self.delete_list_item(&control),
            EditOp::ChoiceChanged { selector, value } => self.choice_changed(&selector, &value),
            EditOp::AddElement { control, extra } => self.add_element(&control, &extra),
            EditOp::Copy { node } => self.copy(&node),
            EditOp::Paste { node } => self.paste(&node),
            EditOp::Move { node, target, position } => self.move_node(&node, &target, position),
        }
    }

    fn confirmed(&self, control: NodeId) -> bool {
        match &self.config.confirm_delete {
            Some(hook) => {
                let label = self.doc.own_text(control);
                hook(&delete_question(&label))
            }
            None => true,
        }
    }

    // ------------------------------------------------------------------
    // Optional blocks
    // ------------------------------------------------------------------

    pub fn add_block(&mut self, control_id: &str) -> EditResult<EditOutcome> {
        let control = self.doc.require_by_id(control_id)?;
        let target = containers::resolve_target(&self.doc, control, true)?;
        if let Some(id) = self.doc.id_attr(target) {
            self.ensure_not_busy(id)?;
        }
        let block = containers::add_block(&mut self.doc, control)?;
        let block_id = self
            .doc
            .id_attr(block)
            .ok_or_else(|| EditError::UnresolvableLocator("block has no id".to_string()))?
            .to_string();
        let info = self.local_node(block);
        let candidates = self.local_candidates(block);
        mirror::add_node(&mut self.tree, info, &candidates, false)?;
        info!("revived block {}", block_id);
        Ok(EditOutcome::Done)
    }

    pub fn delete_block(&mut self, control_id: &str) -> EditResult<EditOutcome> {
        let control = self.doc.require_by_id(control_id)?;
        if !self.confirmed(control) {
            return Ok(EditOutcome::Declined);
        }
        let target = self
            .doc
            .parent(control)
            .ok_or_else(|| EditError::UnresolvableLocator("control has no parent".to_string()))?;
        if let Some(id) = self.doc.id_attr(target) {
            self.ensure_not_busy(id)?;
        }
        let block = containers::delete_block(&mut self.doc, control)?;
        let block_id = self
            .doc
            .id_attr(block)
            .ok_or_else(|| EditError::UnresolvableLocator("block has no id".to_string()))?
            .to_string();
        mirror::remove_node(&mut self.tree, &block_id, false);
        info!("deleted block {}", block_id);
        Ok(EditOutcome::Done)
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    pub fn add_list_item(&mut self, control_id: &str) -> EditResult<EditOutcome> {
        let control = self.doc.require_by_id(control_id)?;
        if let Some(list) = self.doc.parent(control) {
            let template = self
                .doc
                .children(list)
                .into_iter()
                .find(|&c| self.doc.role(c) == Role::ListTemplate);
            if let Some(prefix) = template.and_then(|t| self.doc.id_attr(t)) {
                self.ensure_not_busy(prefix)?;
            }
        }
        let insert = containers::add_list_item(&mut self.doc, control)?;

        let item_id = format!("{}:{}", insert.prefix, insert.index);
        let info = TreeNodeInfo {
            id: mirror::tree_id(&item_id),
            classes: mirror::tree_id(&insert.prefix),
            label: tag_label(&insert.prefix),
            children: Vec::new(),
        };
        let candidates = if insert.index > 0 {
            let previous = format!("{}:{}", insert.prefix, insert.index - 1);
            vec![("after".to_string(), mirror::tree_id(&previous))]
        } else {
            self.local_candidates(insert.item)
        };
        mirror::add_node(&mut self.tree, info, &candidates, true)?;
        info!("inserted {} at {}", insert.prefix, insert.index);
        Ok(EditOutcome::Done)
    }

    pub fn delete_list_item(&mut self, control_id: &str) -> EditResult<EditOutcome> {
        let control = self.doc.require_by_id(control_id)?;
        if !self.confirmed(control) {
            return Ok(EditOutcome::Declined);
        }
        let item = self
            .doc
            .parent(control)
            .ok_or_else(|| EditError::UnresolvableLocator("control has no parent".to_string()))?;
        let item_id = self
            .doc
            .id_attr(item)
            .ok_or_else(|| EditError::UnresolvableLocator("list item has no id".to_string()))?
            .to_string();
        self.ensure_not_busy(&item_id)?;
        let removal = containers::delete_list_item(&mut self.doc, control)?;
        mirror::remove_node(&mut self.tree, &item_id, true);
        info!("removed {} from {}", removal.index, removal.prefix);
        Ok(EditOutcome::Done)
    }

    // ------------------------------------------------------------------
    // Choice groups
    // ------------------------------------------------------------------

    pub fn choice_changed(&mut self, selector_id: &str, value: &str) -> EditResult<EditOutcome> {
        let selector = self.doc.require_by_id(selector_id)?;
        let group = self
            .doc
            .parent(selector)
            .ok_or_else(|| EditError::UnresolvableLocator("selector has no parent".to_string()))?;

        // Dormant options leave the tree; the chosen one re-enters below.
        let option_ids: Vec<String> = self
            .doc
            .children(group)
            .into_iter()
            .filter(|&c| self.doc.role(c) == Role::ChoiceOption)
            .filter_map(|c| self.doc.id_attr(c).map(str::to_string))
            .collect();
        for id in &option_ids {
            self.ensure_not_busy(id)?;
        }

        let outcome = containers::choice_changed(&mut self.doc, selector, value)?;
        for id in &option_ids {
            mirror::remove_node(&mut self.tree, id, false);
        }
        if let ChoiceOutcome::Selected { option } = outcome {
            let info = self.local_node(option);
            let candidates = self.local_candidates(option);
            mirror::add_node(&mut self.tree, info, &candidates, false)?;
        }
        debug!("choice {} -> {:?}", selector_id, value);
        Ok(EditOutcome::Done)
    }

    // ------------------------------------------------------------------
    // Server-rendered inserts
    // ------------------------------------------------------------------

    /// Ask the server to render the element a control stands for and splice
    /// the result into the form and the tree.
    pub fn add_element(
        &mut self,
        control_id: &str,
        extra: &[(String, String)],
    ) -> EditResult<EditOutcome> {
        let control = self.doc.require_by_id(control_id)?;
        let elt_id = if self.doc.tag(control) == "select" {
            self.doc.attr(control, "value").unwrap_or("").to_string()
        } else {
            self.doc
                .attr(control, "data-elt-id")
                .unwrap_or("")
                .to_string()
        };
        if elt_id.is_empty() {
            return Err(EditError::UnresolvableLocator(format!(
                "{} does not name the element to add",
                control_id
            )));
        }
        self.ensure_not_busy(&elt_id)?;

        let params = AddElementParams {
            elt_id: elt_id.clone(),
            dtd_url: self.config.dtd_url.clone(),
            extra: extra.to_vec(),
        }
        .into_query();

        self.begin_pending(&elt_id);
        let url = self.config.add_element_url.clone();
        let result = self.transport.get(&url, &params);
        self.finish_pending(&elt_id);
        let text = result?;

        let response: AddResponse = serde_json::from_str(&text)
            .map_err(|e| EditError::MalformedFragment(e.to_string()))?;
        if let Some(modal) = response.modal {
            return Ok(EditOutcome::NeedsInput { modal });
        }
        let html = response.html.ok_or_else(|| {
            EditError::MalformedFragment("add response without markup".to_string())
        })?;
        let data = response.jstree_data.ok_or_else(|| {
            EditError::MalformedFragment("add response without tree node".to_string())
        })?;

        let is_list = self.doc.has_class(control, "btn-list");
        self.splice_fragment(control, &elt_id, &html)?;
        mirror::add_node(&mut self.tree, data.to_info(), &response.previous, is_list)?;
        info!("added {}", elt_id);
        Ok(EditOutcome::Done)
    }

    /// Put server-rendered markup into the form at a control. A list control
    /// keeps its place and the fragment lands in front of it, everything
    /// behind moving up one slot; any other control is consumed by the
    /// fragment replacing it.
    fn splice_fragment(&mut self, control: NodeId, elt_id: &str, html: &str) -> EditResult<()> {
        let roots = fragment::parse_into(&mut self.doc, html)?;
        if self.doc.has_class(control, "btn-list") {
            let (prefix, _) = ident::split_list_id(elt_id).ok_or_else(|| {
                EditError::UnresolvableLocator(format!("{} is not a list slot", elt_id))
            })?;
            let renumberer = Renumberer::new(prefix);
            let mut run = vec![control];
            run.extend(self.doc.next_siblings(control));
            renumberer.shift_run(&mut self.doc, &run, 1);
            for root in roots {
                self.doc.insert_before(control, root);
            }
        } else {
            for root in roots {
                self.doc.insert_before(control, root);
            }
            self.doc.detach(control);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Copy and paste
    // ------------------------------------------------------------------

    /// Copy a subtree, keyed by its tree node. The clipboard lives on the
    /// server so content can cross documents; the whole form state goes with
    /// the request.
    pub fn copy(&mut self, node_id: &str) -> EditResult<EditOutcome> {
        let elt_id = mirror::form_id(node_id)
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", node_id)))?
            .to_string();
        let body = self.round_trip_body(&elt_id);
        let url = self.config.copy_url.clone();
        let text = self.transport.post(&url, &body)?;
        let response: CopyResponse = serde_json::from_str(&text)
            .map_err(|e| EditError::MalformedFragment(e.to_string()))?;
        if let Some(msg) = response.error_msg {
            self.message(MessageKind::Error, msg);
        } else if let Some(msg) = response.info_msg {
            self.message(MessageKind::Info, msg);
        }
        Ok(EditOutcome::Done)
    }

    /// Paste the server-held clipboard under the subtree of a tree node.
    pub fn paste(&mut self, node_id: &str) -> EditResult<EditOutcome> {
        let elt_id = mirror::form_id(node_id)
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", node_id)))?
            .to_string();
        self.ensure_not_busy(&elt_id)?;
        let body = self.round_trip_body(&elt_id);
        let url = self.config.paste_url.clone();
        let text = self.transport.post(&url, &body)?;
        let response: PasteResponse = serde_json::from_str(&text)
            .map_err(|e| EditError::MalformedFragment(e.to_string()))?;
        if let Some(msg) = response.error_msg {
            self.message(MessageKind::Error, msg);
            return Ok(EditOutcome::Done);
        }
        let target_id = response.elt_id.ok_or_else(|| {
            EditError::MalformedFragment("paste response without target".to_string())
        })?;
        let html = response.html.ok_or_else(|| {
            EditError::MalformedFragment("paste response without markup".to_string())
        })?;
        let data = response.jstree_data.ok_or_else(|| {
            EditError::MalformedFragment("paste response without tree node".to_string())
        })?;

        let control = if response.is_choice {
            self.choice_selector_for(&target_id)?
        } else {
            self.control_for_slot(&target_id)?
        };
        let is_list = self.doc.has_class(control, "btn-list");
        self.splice_fragment(control, &target_id, &html)?;
        mirror::add_node(&mut self.tree, data.to_info(), &response.previous, is_list)?;
        self.message(MessageKind::Info, "Pasted");
        Ok(EditOutcome::Done)
    }

    fn round_trip_body(&self, elt_id: &str) -> String {
        format!(
            "{}&elt_id={}&dtd_url={}",
            self.submit(),
            dom::urlencode(elt_id),
            dom::urlencode(&self.config.dtd_url)
        )
    }

    /// The add control standing for a slot, found through its `data-elt-id`.
    fn control_for_slot(&self, elt_id: &str) -> EditResult<NodeId> {
        let matches = self.doc.find_by_attr("data-elt-id", elt_id);
        match matches.len() {
            0 => Err(EditError::UnresolvableLocator(format!(
                "no control for {}",
                elt_id
            ))),
            1 => Ok(matches[0]),
            _ => Err(EditError::AmbiguousLocator(format!(
                "controls for {}",
                elt_id
            ))),
        }
    }

    /// The choice selector offering a slot, found through its option values.
    fn choice_selector_for(&self, elt_id: &str) -> EditResult<NodeId> {
        let matches: Vec<NodeId> = self
            .doc
            .subtree(self.doc.root())
            .into_iter()
            .filter(|&n| {
                self.doc.tag(n) == "select"
                    && self.doc.children(n).into_iter().any(|option| {
                        self.doc.attr(option, "value") == Some(elt_id)
                    })
            })
            .collect();
        match matches.len() {
            0 => Err(EditError::UnresolvableLocator(format!(
                "no selector offers {}",
                elt_id
            ))),
            1 => Ok(matches[0]),
            _ => Err(EditError::AmbiguousLocator(format!(
                "selectors for {}",
                elt_id
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Tree drags
    // ------------------------------------------------------------------

    pub fn move_node(
        &mut self,
        node_id: &str,
        target_id: &str,
        position: TreePosition,
    ) -> EditResult<EditOutcome> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(EditOutcome::Done);
        };
        if let Some(form_id) = mirror::form_id(node_id) {
            self.ensure_not_busy(form_id)?;
        }
        mirror::commit_move(&mut self.doc, &mut self.tree, node_id, target_id, position)?;
        info!("moved {} {} {:?}", node_id, target_id, position);
        Ok(EditOutcome::Done)
    }

    // ------------------------------------------------------------------
    // Field and panel synchronisation
    // ------------------------------------------------------------------

    /// A field got focus: highlight its element in the tree.
    pub fn focus_field(&mut self, field_id: &str) -> EditResult<()> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(());
        };
        let field = self.doc.require_by_id(field_id)?;
        let container = self
            .doc
            .parent(field)
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", field_id)))?;
        if let Some(container_id) = self.doc.id_attr(container) {
            let tree_id = mirror::tree_id(container_id);
            self.tree.deselect_all();
            self.tree.select(&tree_id);
        }
        Ok(())
    }

    /// A field lost focus with `value` in it: store the value and refresh
    /// the preview snippet next to its tree node.
    pub fn blur_field(&mut self, field_id: &str, value: &str) -> EditResult<()> {
        let field = self.doc.require_by_id(field_id)?;
        if self.doc.tag(field) == "textarea" {
            self.doc.set_own_text(field, value);
        } else {
            self.doc.set_attr(field, "value", value);
        }
        let container = self
            .doc
            .parent(field)
            .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", field_id)))?;
        if let Some(container_id) = self.doc.id_attr(container).map(str::to_string) {
            mirror::preview_text(&mut self.tree, &container_id, value);
        }
        Ok(())
    }

    /// A tree node was selected: hand back the form element to scroll to.
    pub fn node_selected(&mut self, node_id: &str) -> EditResult<Option<String>> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(None);
        };
        Ok(mirror::form_id(node_id).map(str::to_string))
    }

    /// A collapsible panel opened in the form: open its tree node.
    pub fn panel_shown(&mut self, panel_id: &str) -> EditResult<()> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(());
        };
        if let Some(form_id) = mirror::panel_form_id(panel_id) {
            self.tree.open(&mirror::tree_id(form_id));
        }
        Ok(())
    }

    pub fn panel_hidden(&mut self, panel_id: &str) -> EditResult<()> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(());
        };
        if let Some(form_id) = mirror::panel_form_id(panel_id) {
            self.tree.close(&mirror::tree_id(form_id));
        }
        Ok(())
    }

    /// A tree node was opened: expand the matching collapsible panel.
    pub fn node_opened(&mut self, node_id: &str) -> EditResult<()> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(());
        };
        set_panel_open(&mut self.doc, node_id, true)
    }

    pub fn node_closed(&mut self, node_id: &str) -> EditResult<()> {
        let Some(_guard) = self.transition.enter() else {
            return Ok(());
        };
        set_panel_open(&mut self.doc, node_id, false)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Fetch the comment dialog for a commentable control, seeded with the
    /// comment currently attached.
    pub fn fetch_comment_modal(&mut self, control_id: &str) -> EditResult<String> {
        let control = self.doc.require_by_id(control_id)?;
        let current = self
            .comment_field(control)
            .map(|f| self.doc.own_text(f))
            .unwrap_or_default();
        let url = self.config.comment_modal_url.clone();
        let text = self
            .transport
            .get(&url, &[("comment".to_string(), current)])?;
        let response: CommentModalResponse = serde_json::from_str(&text)
            .map_err(|e| EditError::MalformedFragment(e.to_string()))?;
        Ok(response.content)
    }

    /// Attach a comment to a commentable control: the text lives in a hidden
    /// field named by the control's `data-comment-name`, created on first
    /// use, and the control itself advertises the comment through its title.
    pub fn attach_comment(&mut self, control_id: &str, value: &str) -> EditResult<()> {
        let control = self.doc.require_by_id(control_id)?;
        let name = self
            .doc
            .attr(control, "data-comment-name")
            .ok_or_else(|| {
                EditError::UnresolvableLocator(format!("{} is not commentable", control_id))
            })?
            .to_string();
        let field = match self.comment_field(control) {
            Some(field) => field,
            None => {
                let field = self.doc.create_element("textarea");
                self.doc.set_attr(field, "name", &name);
                self.doc.set_attr(field, "class", "_comment");
                self.doc.insert_after(control, field);
                field
            }
        };
        self.doc.set_own_text(field, value);
        self.doc.set_attr(control, "title", value);
        if value.is_empty() {
            self.doc.remove_class(control, "has-comment");
        } else {
            self.doc.add_class(control, "has-comment");
        }
        Ok(())
    }

    fn comment_field(&self, control: NodeId) -> Option<NodeId> {
        self.doc
            .next_sibling(control)
            .filter(|&n| self.doc.has_class(n, "_comment"))
    }

    // ------------------------------------------------------------------
    // Local tree node rebuilding
    // ------------------------------------------------------------------

    /// Shadow node for a block handled without a server round trip. The
    /// label is the element's tag name; previews fill in the rest on blur.
    fn local_node(&self, block: NodeId) -> TreeNodeInfo {
        let id = self.doc.id_attr(block).unwrap_or("").to_string();
        let classes = if ident::index_of(&id).is_some() {
            mirror::tree_id(ident::prefix_of(&id))
        } else {
            mirror::tree_id(&id)
        };
        TreeNodeInfo {
            id: mirror::tree_id(&id),
            classes,
            label: tag_label(&id),
            children: Vec::new(),
        }
    }

    /// Insertion-point candidates for a locally rebuilt node: after the
    /// nearest preceding shadowed sibling, else first under the nearest
    /// shadowed ancestor.
    fn local_candidates(&self, block: NodeId) -> Vec<(String, String)> {
        let mut candidates = Vec::new();
        let mut cursor = self.doc.prev_sibling(block);
        while let Some(sibling) = cursor {
            if let Some(id) = self.doc.id_attr(sibling) {
                let shadow = mirror::tree_id(id);
                if self.tree.contains(&shadow) {
                    candidates.push(("after".to_string(), shadow));
                    break;
                }
            }
            cursor = self.doc.prev_sibling(sibling);
        }
        let mut ancestor = self.doc.parent(block);
        while let Some(node) = ancestor {
            if let Some(id) = self.doc.id_attr(node) {
                let shadow = mirror::tree_id(id);
                if self.tree.contains(&shadow) {
                    candidates.push(("first".to_string(), shadow));
                    break;
                }
            }
            ancestor = self.doc.parent(node);
        }
        candidates
    }
}

/// Toggle the `in` class on the collapsible panel mirroring a tree node.
fn set_panel_open(doc: &mut Document, node_id: &str, open: bool) -> EditResult<()> {
    let Some(form_id) = mirror::form_id(node_id) else {
        return Ok(());
    };
    let panel_id = mirror::collapse_id(form_id);
    if let Some(panel) = doc.find_by_id(&panel_id)? {
        if open {
            doc.add_class(panel, "in");
        } else {
            doc.remove_class(panel, "in");
        }
    }
    Ok(())
}

/// Human-readable tag name at the end of an identifier, e.g. `comment` for
/// `test:0:comment`.
fn tag_label(id: &str) -> String {
    id.rsplit(':')
        .find(|segment| segment.parse::<u64>().is_err())
        .unwrap_or(id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::tree::{node, SimpleTree};

    /// Canned transport: hands out prepared responses in order.
    struct FakeTransport {
        responses: Vec<EditResult<String>>,
        requests: Vec<(String, String)>,
    }

    impl FakeTransport {
        fn new(responses: Vec<EditResult<String>>) -> Self {
            FakeTransport {
                responses,
                requests: Vec::new(),
            }
        }
    }

    impl Transport for FakeTransport {
        fn get(&mut self, url: &str, params: &[(String, String)]) -> EditResult<String> {
            let rendered: Vec<String> =
                params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            self.requests.push((url.to_string(), rendered.join("&")));
            self.responses.remove(0)
        }

        fn post(&mut self, url: &str, body: &str) -> EditResult<String> {
            self.requests.push((url.to_string(), body.to_string()));
            self.responses.remove(0)
        }
    }

    const FORM: &str = r#"<form id="root">
        <div class="container" id="test">
            <textarea name="test:title:value" id="test:title:value">t</textarea>
            <a class="btn-add" id="addqcm" data-elt-id="test:qcm:0"></a>
        </div>
    </form>"#;

    fn tree_with_root() -> SimpleTree {
        let mut root = node("tree_test", "tree_test", "test");
        root.children
            .push(node("tree_test:title", "tree_test:title", "title"));
        SimpleTree::with_root(root)
    }

    fn editor(responses: Vec<EditResult<String>>) -> Editor<SimpleTree, FakeTransport> {
        let doc = Document::parse(FORM).unwrap();
        let mut config = EditorConfig::default();
        config.add_element_url = "/add".to_string();
        config.copy_url = "/copy".to_string();
        config.paste_url = "/paste".to_string();
        config.dtd_url = "test.dtd".to_string();
        Editor::new(doc, tree_with_root(), FakeTransport::new(responses), config)
    }

    const ADD_RESPONSE: &str = r#"{
        "html": "<div class=\"container\" id=\"test:qcm:0\"><input name=\"test:qcm:0:value\" value=\"\"/></div>",
        "jstree_data": {
            "data": "qcm",
            "attr": {"id": "tree_test:qcm:0", "class": "tree_test:qcm"},
            "metadata": {"id": "tree_test:qcm:0"}
        },
        "previous": [["after", "tree_test:title"], ["first", "tree_test"]]
    }"#;

    #[test]
    fn test_add_element_splices_form_and_tree() {
        let mut editor = editor(vec![Ok(ADD_RESPONSE.to_string())]);
        let outcome = editor.apply(EditOp::AddElement {
            control: "addqcm".to_string(),
            extra: Vec::new(),
        });
        assert_eq!(outcome, Ok(EditOutcome::Done));

        let block = editor.document().require_by_id("test:qcm:0").unwrap();
        assert!(editor.document().id_attr(block).is_some());
        // The consumed control is gone.
        assert!(editor.document().find_by_id("addqcm").unwrap().is_none());
        assert_eq!(
            editor.tree().child_ids("tree_test"),
            ["tree_test:title", "tree_test:qcm:0"]
        );
        assert!(editor.submit().contains("test%3Aqcm%3A0%3Avalue="));
    }

    #[test]
    fn test_add_element_sends_slot_and_grammar() {
        let mut editor = editor(vec![Ok(ADD_RESPONSE.to_string())]);
        editor
            .add_element("addqcm", &[("enctype".to_string(), "qcm".to_string())])
            .unwrap();
        let (url, params) = editor.transport.requests[0].clone();
        assert_eq!(url, "/add");
        assert_eq!(params, "elt_id=test:qcm:0&dtd_url=test.dtd&enctype=qcm");
    }

    #[test]
    fn test_add_element_modal_round() {
        let mut editor = editor(vec![Ok(r#"{"modal": "<form>ask</form>"}"#.to_string())]);
        let outcome = editor
            .apply(EditOp::AddElement {
                control: "addqcm".to_string(),
                extra: Vec::new(),
            })
            .unwrap();
        assert_eq!(
            outcome,
            EditOutcome::NeedsInput {
                modal: "<form>ask</form>".to_string()
            }
        );
        // Nothing changed while waiting for the dialog.
        assert!(editor.document().find_by_id("addqcm").unwrap().is_some());
    }

    #[test]
    fn test_add_element_network_error_clears_busy() {
        let mut editor = editor(vec![Err(EditError::Network {
            status: 502,
            text: "Bad Gateway".to_string(),
        })]);
        let err = editor
            .add_element("addqcm", &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "502 Bad Gateway");
        // The slot is not stuck busy after the failure.
        assert!(editor.ensure_not_busy("test:qcm:0").is_ok());
    }

    #[test]
    fn test_busy_subtree_rejects_structural_edit() {
        let mut editor = editor(vec![]);
        editor.begin_pending("test:qcm");
        assert!(matches!(
            editor.ensure_not_busy("test:qcm:0:value"),
            Err(EditError::SubtreeBusy(_))
        ));
        assert!(editor.ensure_not_busy("test:title:value").is_ok());
        editor.finish_pending("test:qcm");
        assert!(editor.ensure_not_busy("test:qcm:0:value").is_ok());
    }

    #[test]
    fn test_copy_relays_server_message() {
        let mut editor = editor(vec![Ok(r#"{"info_msg": "Copied"}"#.to_string())]);
        editor.apply(EditOp::Copy { node: "tree_test:title".to_string() }).unwrap();
        assert_eq!(
            editor.take_messages(),
            vec![Message { kind: MessageKind::Info, text: "Copied".to_string() }]
        );
        let (url, body) = editor.transport.requests[0].clone();
        assert_eq!(url, "/copy");
        assert!(body.contains("elt_id=test%3Atitle"));
        assert!(body.contains("dtd_url=test.dtd"));
    }

    #[test]
    fn test_paste_error_is_a_message_not_a_failure() {
        let mut editor = editor(vec![Ok(r#"{"error_msg": "Nothing to paste"}"#.to_string())]);
        let outcome = editor.paste("tree_test").unwrap();
        assert_eq!(outcome, EditOutcome::Done);
        let messages = editor.take_messages();
        assert_eq!(messages[0].kind, MessageKind::Error);
        assert_eq!(messages[0].text, "Nothing to paste");
    }

    #[test]
    fn test_paste_splices_like_add() {
        let paste = r#"{
            "elt_id": "test:qcm:0",
            "html": "<div class=\"container\" id=\"test:qcm:0\"><input name=\"test:qcm:0:value\" value=\"pasted\"/></div>",
            "jstree_data": {
                "data": "qcm",
                "attr": {"id": "tree_test:qcm:0", "class": "tree_test:qcm"},
                "metadata": {"id": "tree_test:qcm:0"}
            },
            "previous": [["after", "tree_test:title"]]
        }"#;
        let mut editor = editor(vec![Ok(paste.to_string())]);
        editor.paste("tree_test").unwrap();
        assert!(editor.submit().contains("test%3Aqcm%3A0%3Avalue=pasted"));
        assert!(editor.tree().contains("tree_test:qcm:0"));
        assert_eq!(editor.take_messages()[0].text, "Pasted");
    }

    #[test]
    fn test_confirm_hook_can_decline() {
        let markup = r##"<div>
            <a class="btn-add hidden" data-target="#test:0"></a>
            <div class="container" id="test:0">
                <a class="btn-delete" id="del" data-target="#test:0">Delete choice</a>
                <input name="test:0:value" value="1"/>
            </div>
        </div>"##;
        let doc = Document::parse(markup).unwrap();
        let mut config = EditorConfig::default();
        config.confirm_delete = Some(Box::new(|question: &str| {
            assert_eq!(question, "Are you sure you want to delete this choice");
            false
        }));
        let tree = SimpleTree::with_root(node("tree_test:0", "tree_test", "choice"));
        let mut editor = Editor::new(doc, tree, FakeTransport::new(vec![]), config);
        let outcome = editor.delete_block("del").unwrap();
        assert_eq!(outcome, EditOutcome::Declined);
        // Still live in both views.
        assert_eq!(editor.submit(), "test%3A0%3Avalue=1");
        assert!(editor.tree().contains("tree_test:0"));
    }

    #[test]
    fn test_focus_and_blur_sync_tree() {
        let mut editor = editor(vec![]);
        editor.focus_field("test:title:value").unwrap();
        assert_eq!(editor.tree().selected(), Some("tree_test".to_string()));

        editor.blur_field("test:title:value", "new title text").unwrap();
        let label = editor.tree().label("tree_test").unwrap();
        assert!(label.contains("(new title text)"));
        assert_eq!(editor.submit(), "test%3Atitle%3Avalue=new+title+text");
    }

    #[test]
    fn test_panel_and_node_open_state() {
        let markup = r#"<form>
            <div class="container" id="test:0">
                <div class="panel-collapse" id="collapse-test:0"></div>
            </div>
        </form>"#;
        let doc = Document::parse(markup).unwrap();
        let tree = SimpleTree::with_root(node("tree_test:0", "tree_test", "x"));
        let mut editor =
            Editor::new(doc, tree, FakeTransport::new(vec![]), EditorConfig::default());

        editor.panel_shown("collapse-test:0").unwrap();
        assert!(editor.tree().is_open("tree_test:0"));
        editor.panel_hidden("collapse-test:0").unwrap();
        assert!(!editor.tree().is_open("tree_test:0"));

        editor.node_opened("tree_test:0").unwrap();
        let panel = editor.document().require_by_id("collapse-test:0").unwrap();
        assert!(editor.document().has_class(panel, "in"));
        editor.node_closed("tree_test:0").unwrap();
        assert!(!editor.document().has_class(panel, "in"));
    }

    #[test]
    fn test_attach_comment_creates_field_once() {
        let markup = r#"<div>
            <a id="c" data-comment-name="test:0:_comment"></a>
        </div>"#;
        let doc = Document::parse(markup).unwrap();
        let mut editor = Editor::new(
            doc,
            SimpleTree::new(),
            FakeTransport::new(vec![]),
            EditorConfig::default(),
        );
        editor.attach_comment("c", "needs review").unwrap();
        assert_eq!(editor.submit(), "test%3A0%3A_comment=needs+review");
        let control = editor.document().require_by_id("c").unwrap();
        assert_eq!(editor.document().attr(control, "title"), Some("needs review"));
        assert!(editor.document().has_class(control, "has-comment"));

        // Updating reuses the field instead of stacking another one.
        editor.attach_comment("c", "").unwrap();
        assert_eq!(editor.submit(), "test%3A0%3A_comment=");
        assert!(!editor.document().has_class(control, "has-comment"));
    }

    #[test]
    fn test_node_selected_round_trip_is_guarded() {
        let mut editor = editor(vec![]);
        let target = editor.node_selected("tree_test:title").unwrap();
        assert_eq!(target.as_deref(), Some("test:title"));
    }
}

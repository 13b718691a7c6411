//! Form/tree mirroring
//!
//! Every structural element of the form has a shadow node in the navigation
//! tree, linked purely by naming: the tree node id is the form id behind
//! [`TREE_PREFIX`], and a collapsible panel id is the form id behind
//! [`COLLAPSE_PREFIX`]. The functions here translate structural form edits
//! into tree commands and a tree drag back into a form edit, keeping sibling
//! numbering contiguous on both sides.
//!
//! Cross-view event echo (a tree selection focusing the form, which would
//! select the tree again) is cut by the [`Transition`] flag.

use std::cell::Cell;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::form::dom::{Document, Role};
use crate::form::error::{EditError, EditResult};
use crate::form::ident;
use crate::form::renumber::{Mode, Renumberer, Step};
use crate::form::tree::{TreeNodeInfo, TreePosition, TreeWidget};

pub const TREE_PREFIX: &str = "tree_";
pub const COLLAPSE_PREFIX: &str = "collapse-";

/// Tree node id shadowing a form id.
pub fn tree_id(form_id: &str) -> String {
    format!("{}{}", TREE_PREFIX, form_id)
}

/// Back from a tree node id to the form id it shadows.
pub fn form_id(tree_id: &str) -> Option<&str> {
    tree_id.strip_prefix(TREE_PREFIX)
}

/// Collapsible panel id of a form element.
pub fn collapse_id(form_id: &str) -> String {
    format!("{}{}", COLLAPSE_PREFIX, form_id)
}

/// Back from a panel id to the form id it belongs to.
pub fn panel_form_id(collapse_id: &str) -> Option<&str> {
    collapse_id.strip_prefix(COLLAPSE_PREFIX)
}

/// Pick the insertion point from `[position, locator]` candidates, most
/// specific first. The first locator resolving to exactly one node wins; a
/// locator with several matches aborts instead of inserting somewhere
/// arbitrary.
pub fn find_insert_point(
    tree: &dyn TreeWidget,
    candidates: &[(String, String)],
) -> EditResult<(TreePosition, String)> {
    for (position, locator) in candidates {
        let position = TreePosition::from_wire(position).ok_or_else(|| {
            EditError::UnresolvableLocator(format!("unknown position {}", position))
        })?;
        match tree.count(locator) {
            0 => continue,
            1 => return Ok((position, locator.clone())),
            _ => return Err(EditError::AmbiguousLocator(format!("#{}", locator))),
        }
    }
    Err(EditError::UnresolvableLocator(
        "no insert point candidate resolved".to_string(),
    ))
}

/// Insert a node subtree at the resolved insertion point. For a list member
/// the same-type siblings behind the slot are renumbered up *first*, so the
/// incoming id is vacant by the time the node lands.
pub fn add_node(
    tree: &mut dyn TreeWidget,
    node: TreeNodeInfo,
    candidates: &[(String, String)],
    is_list: bool,
) -> EditResult<String> {
    let (position, anchor) = find_insert_point(tree, candidates)?;
    let id = node.id.clone();
    if is_list {
        if let Some(type_tag) = ident::first_type_tag(&node.classes).map(str::to_string) {
            shift_run_up(tree, &anchor, position, &type_tag);
        }
    }
    tree.insert(&anchor, position, node)?;
    tree.open(&id);
    Ok(id)
}

/// Renumber the same-type run at an insertion point so the slot the new node
/// takes is free and everything behind it moves up by one.
fn shift_run_up(tree: &mut dyn TreeWidget, anchor: &str, position: TreePosition, type_tag: &str) {
    let pool = match position {
        TreePosition::FirstChild | TreePosition::LastChild => tree.child_ids(anchor),
        TreePosition::Before | TreePosition::After => match tree.parent_id(anchor) {
            Some(parent) => tree.child_ids(&parent),
            None => tree.root_ids(),
        },
    };
    let run: Vec<(usize, String)> = pool
        .iter()
        .enumerate()
        .filter(|(_, id)| {
            tree.classes(id).as_deref().and_then(ident::first_type_tag) == Some(type_tag)
        })
        .map(|(pool_pos, id)| (pool_pos, id.clone()))
        .collect();
    let slot = match position {
        TreePosition::FirstChild => 0,
        TreePosition::LastChild => run.len(),
        TreePosition::Before | TreePosition::After => {
            let anchor_pool_pos = pool.iter().position(|id| id == anchor);
            match anchor_pool_pos {
                Some(app) => {
                    let before = run.iter().filter(|(p, _)| *p < app).count();
                    let anchor_in_run = run.iter().any(|(p, _)| *p == app);
                    if position == TreePosition::After && anchor_in_run {
                        before + 1
                    } else {
                        before
                    }
                }
                None => return,
            }
        }
    };
    let targets: Vec<(String, u64)> = run[slot.min(run.len())..]
        .iter()
        .enumerate()
        .map(|(offset, (_, id))| (id.clone(), (slot + offset + 1) as u64))
        .collect();
    assign_indices(tree, &Renumberer::new(type_tag), &targets);
}

/// Remove the node shadowing a form element. For a list member the gap is
/// closed by renumbering everything that followed it.
pub fn remove_node(tree: &mut dyn TreeWidget, form_id: &str, is_list: bool) {
    let id = tree_id(form_id);
    if !is_list {
        tree.remove(&id);
        return;
    }
    let siblings = same_type_siblings(tree, &id);
    let pos = siblings.iter().position(|s| *s == id);
    tree.remove(&id);
    if let Some(pos) = pos {
        if let Some(next) = siblings.get(pos + 1) {
            renumber_siblings(tree, next, true);
        }
    }
}

/// Same-type siblings of a node, itself included: the children of its parent
/// sharing its type tag, in order.
pub fn same_type_siblings(tree: &dyn TreeWidget, id: &str) -> Vec<String> {
    let Some(type_tag) = tree
        .classes(id)
        .as_deref()
        .and_then(ident::first_type_tag)
        .map(str::to_string)
    else {
        return Vec::new();
    };
    let pool = match tree.parent_id(id) {
        Some(parent) => tree.child_ids(&parent),
        None => tree.root_ids(),
    };
    pool.into_iter()
        .filter(|candidate| {
            tree.classes(candidate)
                .as_deref()
                .and_then(ident::first_type_tag)
                == Some(&type_tag)
        })
        .collect()
}

/// Reassign positional indices across a node's same-type sibling run. Only
/// siblings after the node move; `include_self` pulls the node itself in too,
/// for the removal case where it is the first survivor of the gap.
///
/// Sibling ids must be unique when this runs; [`add_node`] keeps them so by
/// renumbering before it inserts.
pub fn renumber_siblings(tree: &mut dyn TreeWidget, id: &str, include_self: bool) {
    let siblings = same_type_siblings(tree, id);
    let Some(pos) = siblings.iter().position(|s| s == id) else {
        return;
    };
    let Some(type_tag) = tree
        .classes(id)
        .as_deref()
        .and_then(ident::first_type_tag)
        .map(str::to_string)
    else {
        return;
    };
    let targets: Vec<(String, u64)> = siblings
        .iter()
        .enumerate()
        .filter(|(j, _)| *j > pos || (include_self && *j == pos))
        .map(|(j, sibling)| (sibling.clone(), j as u64))
        .collect();
    assign_indices(tree, &Renumberer::new(&type_tag), &targets);
}

/// A vacant index range used while reassignment is in flight, so a run can
/// be permuted without two live nodes ever sharing an id.
const TEMP_BASE: u64 = 1 << 32;

fn assign_indices(tree: &mut dyn TreeWidget, renumberer: &Renumberer, targets: &[(String, u64)]) {
    let mut parked: Vec<(String, u64)> = Vec::with_capacity(targets.len());
    for (id, index) in targets {
        let temp = renumber_subtree(tree, renumberer, id, TEMP_BASE + index);
        parked.push((temp, *index));
    }
    for (id, index) in parked {
        renumber_subtree(tree, renumberer, &id, index);
    }
}

/// Rewrite one subtree to the given index; returns the root's id afterwards.
fn renumber_subtree(
    tree: &mut dyn TreeWidget,
    renumberer: &Renumberer,
    id: &str,
    index: u64,
) -> String {
    let children = tree.child_ids(id);
    if let Some(classes) = tree.classes(id) {
        if let Some(rewritten) = renumberer.rewrite_value(&classes, Mode::Assign(index)) {
            tree.set_classes(id, &rewritten);
        }
    }
    let mut current = id.to_string();
    if let Some(rewritten) = renumberer.rewrite_token(id, Mode::Assign(index)) {
        tree.change_id(id, &rewritten);
        current = rewritten;
    }
    for child in children {
        renumber_subtree(tree, renumberer, &child, index);
    }
    current
}

/// Validate a drag before committing it: reordering is only supported inside
/// one list, so the node must stay under its parent, land next to a sibling
/// of its own type, and only `before`/`after` drops make sense.
pub fn check_move(
    tree: &dyn TreeWidget,
    node_id: &str,
    target_id: &str,
    position: TreePosition,
) -> EditResult<()> {
    if !matches!(position, TreePosition::Before | TreePosition::After) {
        return Err(EditError::UnsupportedMove(
            "a node can only move before or after a sibling".to_string(),
        ));
    }
    if !tree.contains(node_id) {
        return Err(EditError::UnresolvableLocator(format!("#{}", node_id)));
    }
    if !tree.contains(target_id) {
        return Err(EditError::UnresolvableLocator(format!("#{}", target_id)));
    }
    if tree.parent_id(node_id) != tree.parent_id(target_id) {
        return Err(EditError::UnsupportedMove(
            "a node cannot change parent".to_string(),
        ));
    }
    let node_tag = tree.classes(node_id).as_deref().and_then(ident::first_type_tag).map(str::to_string);
    let target_tag = tree.classes(target_id).as_deref().and_then(ident::first_type_tag).map(str::to_string);
    if node_tag.is_none() || node_tag != target_tag {
        return Err(EditError::UnsupportedMove(
            "a node can only move next to a sibling of its own type".to_string(),
        ));
    }
    Ok(())
}

/// Commit a validated drag: move the form element (with its paired add
/// control), move the tree node, and renumber the whole run on both sides.
pub fn commit_move(
    doc: &mut Document,
    tree: &mut dyn TreeWidget,
    node_id: &str,
    target_id: &str,
    position: TreePosition,
) -> EditResult<()> {
    check_move(tree, node_id, target_id, position)?;

    let drag_form_id = form_id(node_id)
        .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", node_id)))?
        .to_string();
    let target_form_id = form_id(target_id)
        .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", target_id)))?
        .to_string();
    let drag = doc.require_by_id(&drag_form_id)?;
    let target = doc.require_by_id(&target_form_id)?;

    let control = doc
        .prev_sibling(drag)
        .filter(|&c| doc.role(c) == Role::AddControl);

    match position {
        TreePosition::Before => {
            // Land in front of the target's own add control so the
            // control/item pairing survives.
            let anchor = doc
                .prev_sibling(target)
                .filter(|&c| doc.role(c) == Role::AddControl)
                .unwrap_or(target);
            if let Some(control) = control {
                doc.insert_before(anchor, control);
            }
            doc.insert_before(anchor, drag);
        }
        TreePosition::After => {
            doc.insert_after(target, drag);
            if let Some(control) = control {
                doc.insert_after(target, control);
            }
        }
        _ => unreachable!("rejected by check_move"),
    }

    // Renumber the whole form run; controls pair up with the item after them.
    let (prefix, _) = ident::split_list_id(&drag_form_id).ok_or_else(|| {
        EditError::UnsupportedMove(format!("{} is not a list member", drag_form_id))
    })?;
    let renumberer = Renumberer::new(prefix);
    if let Some(parent) = doc.parent(drag) {
        let run = doc.children(parent);
        renumberer.assign_run(doc, &run, Step::Paired { offset: 0 });
    }

    // Move the shadow node and renumber the whole tree run.
    let info = tree
        .export(node_id)
        .ok_or_else(|| EditError::UnresolvableLocator(format!("#{}", node_id)))?;
    tree.remove(node_id);
    tree.insert(target_id, position, info)?;
    let siblings = same_type_siblings(tree, node_id);
    if let Some(first) = siblings.first() {
        let first = first.clone();
        renumber_siblings(tree, &first, true);
    }
    Ok(())
}

static PREVIEW: Lazy<Regex> = Lazy::new(|| Regex::new(r">[^<]*<").unwrap());

/// Push a field's current text into its node label as a truncated preview.
/// The preview lives in a trailing span so the label proper stays intact.
pub fn preview_text(tree: &mut dyn TreeWidget, form_id: &str, value: &str) {
    let id = tree_id(form_id);
    let Some(mut label) = tree.label(&id) else {
        return;
    };
    if !label.contains("_tree_text") {
        label.push_str(r#"<span class="_tree_text"></span>"#);
    }
    let preview = if value.is_empty() {
        String::new()
    } else {
        format!(" ({})", ident::truncate_label(value, 30))
    };
    let label = PREVIEW
        .replace(&label, format!(">{}<", preview).as_str())
        .into_owned();
    tree.set_label(&id, &label);
}

/// Reentrancy cut-out for cross-view event echo. `enter` yields a guard for
/// the outermost call and `None` while one is already live.
#[derive(Debug, Default)]
pub struct Transition {
    active: Cell<bool>,
}

impl Transition {
    pub fn new() -> Self {
        Transition::default()
    }

    pub fn enter(&self) -> Option<TransitionGuard<'_>> {
        if self.active.get() {
            return None;
        }
        self.active.set(true);
        Some(TransitionGuard { flag: &self.active })
    }
}

pub struct TransitionGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

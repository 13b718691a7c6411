//! Container state machines
//!
//! Three kinds of container manage element presence:
//!
//!   - an optional block toggles between absent (class `deleted`, its add
//!     control visible) and present (no `deleted`, the add control `hidden`);
//!     the block's markup never leaves the document, only its submit
//!     eligibility changes;
//!   - a list grows by cloning its `growing-source` template and shrinks by
//!     removing an item outright, renumbering the following run either way;
//!   - a choice group keeps at most one `conditional-option` block alive,
//!     switched by its `select.conditional`.
//!
//! The operations here return what changed so the caller can mirror the edit
//! into the navigation tree.

use crate::form::dom::{Document, NodeId, Role};
use crate::form::error::{EditError, EditResult};
use crate::form::ident;
use crate::form::renumber::{is_under_prefix, Mode, Renumberer};

/// Result of inserting a list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListInsert {
    pub item: NodeId,
    pub prefix: String,
    pub index: u64,
}

/// Result of removing a list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRemoval {
    pub prefix: String,
    pub index: u64,
}

/// Result of switching a choice group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// The option matching the selector value is now the live one.
    Selected { option: NodeId },
    /// No value selected, every option is dormant again.
    Cleared,
}

/// Resolve the container a control operates on: through its `data-target`
/// reference when it carries one, falling back to the adjacent sibling.
pub(crate) fn resolve_target(doc: &Document, control: NodeId, next: bool) -> EditResult<NodeId> {
    if let Some(target) = doc.attr(control, "data-target") {
        let id = ident::unescape(target.trim_start_matches('#'));
        return doc.require_by_id(&id);
    }
    let sibling = if next {
        doc.next_sibling(control)
    } else {
        doc.prev_sibling(control)
    };
    sibling.ok_or_else(|| EditError::UnresolvableLocator("control has no target".to_string()))
}

/// Bring an optional block back: clear its `deleted` marker and hide the add
/// control that revealed it.
pub fn add_block(doc: &mut Document, control: NodeId) -> EditResult<NodeId> {
    let block = resolve_target(doc, control, true)?;
    doc.remove_class(block, "deleted");
    doc.add_class(control, "hidden");
    Ok(block)
}

/// Mark an optional block absent and reveal the add control before it. The
/// subtree stays in the document with its field values intact, so re-adding
/// restores them.
pub fn delete_block(doc: &mut Document, control: NodeId) -> EditResult<NodeId> {
    let block = doc
        .parent(control)
        .ok_or_else(|| EditError::UnresolvableLocator("delete control has no parent".to_string()))?;
    doc.add_class(block, "deleted");
    if let Some(add) = doc.prev_sibling(block) {
        if doc.role(add) == Role::AddControl {
            doc.remove_class(add, "hidden");
        }
    }
    if let Some(option) = doc.parent(block) {
        update_choice_container(doc, option);
    }
    Ok(block)
}

/// Insert a list item at the position of `control`.
///
/// The new item is a clone of the list's template, renumbered to the slot the
/// control sits at; a fresh add control goes in after it and everything
/// behind the pair shifts up by one.
pub fn add_list_item(doc: &mut Document, control: NodeId) -> EditResult<ListInsert> {
    let list = doc
        .parent(control)
        .ok_or_else(|| EditError::UnresolvableLocator("add control has no parent".to_string()))?;
    let template = doc
        .children(list)
        .into_iter()
        .find(|&c| doc.role(c) == Role::ListTemplate)
        .ok_or_else(|| EditError::UnresolvableLocator("list has no template".to_string()))?;
    let prefix = doc
        .id_attr(template)
        .ok_or_else(|| EditError::UnresolvableLocator("list template has no id".to_string()))?
        .to_string();

    let siblings = doc.children(list);
    let control_pos = siblings
        .iter()
        .position(|&s| s == control)
        .ok_or_else(|| EditError::UnresolvableLocator("add control left its list".to_string()))?;
    let index = siblings[..control_pos]
        .iter()
        .filter(|&&s| doc.role(s) == Role::ListItem)
        .count() as u64;

    let renumberer = Renumberer::new(&prefix);

    // Shift the tail first so the template clone can take the freed slot.
    let tail: Vec<NodeId> = siblings[control_pos + 1..].to_vec();
    renumberer.shift_run(doc, &tail, 1);

    let item = doc.clone_subtree(template);
    doc.remove_class(item, "growing-source");
    doc.remove_class(item, "deleted");
    doc.set_attr(item, "id", &format!("{}:{}", prefix, index));
    renumberer.apply(doc, item, Mode::Assign(index));
    doc.insert_after(control, item);

    let next_control = doc.clone_subtree(control);
    doc.remove_class(next_control, "hidden");
    renumberer.apply(doc, next_control, Mode::Assign(index + 1));
    // A control id that does not renumber with the list would collide with
    // the original's, so the clone goes without one.
    if let Some(id) = doc.id_attr(next_control) {
        if !is_under_prefix(id, &prefix) {
            doc.remove_attr(next_control, "id");
        }
    }
    doc.insert_after(item, next_control);

    Ok(ListInsert {
        item,
        prefix,
        index,
    })
}

/// Remove a list item outright, together with the add control paired with
/// it, and close the numbering gap it leaves.
pub fn delete_list_item(doc: &mut Document, control: NodeId) -> EditResult<ListRemoval> {
    let item = doc
        .parent(control)
        .ok_or_else(|| EditError::UnresolvableLocator("delete control has no parent".to_string()))?;
    let item_id = doc
        .id_attr(item)
        .ok_or_else(|| EditError::UnresolvableLocator("list item has no id".to_string()))?
        .to_string();
    let index = ident::index_of(&item_id)
        .ok_or_else(|| EditError::UnresolvableLocator(format!("{} is not a list item", item_id)))?;
    let prefix = ident::prefix_of(&item_id).to_string();

    if let Some(add) = doc.prev_sibling(item) {
        if doc.role(add) == Role::AddControl {
            doc.detach(add);
        }
    }
    // Detaching severs the parent link, so remember the list holding the
    // item while it can still be reached.
    let host = doc.parent(item);
    let tail = doc.next_siblings(item);
    doc.detach(item);
    Renumberer::new(&prefix).shift_run(doc, &tail, -1);
    if let Some(host) = host {
        update_choice_container(doc, host);
    }

    Ok(ListRemoval { prefix, index })
}

/// Switch a choice group to the option named by the selector's value. An
/// empty value puts every option back to dormant.
pub fn choice_changed(
    doc: &mut Document,
    selector: NodeId,
    value: &str,
) -> EditResult<ChoiceOutcome> {
    let group = doc
        .parent(selector)
        .ok_or_else(|| EditError::UnresolvableLocator("selector has no parent".to_string()))?;
    doc.set_attr(selector, "value", value);

    let options: Vec<NodeId> = doc
        .children(group)
        .into_iter()
        .filter(|&c| doc.role(c) == Role::ChoiceOption)
        .collect();

    if value.is_empty() {
        for &option in &options {
            doc.add_class(option, "deleted");
        }
        doc.remove_class(selector, "hidden");
        return Ok(ChoiceOutcome::Cleared);
    }

    let chosen = options
        .iter()
        .copied()
        .find(|&o| doc.has_class(o, value))
        .ok_or_else(|| EditError::UnresolvableLocator(format!("no option for {}", value)))?;
    for &option in &options {
        if option != chosen {
            doc.add_class(option, "deleted");
        }
    }
    doc.remove_class(chosen, "deleted");
    doc.add_class(selector, "hidden");

    // Reveal the option's content the way a manual add would; a list option
    // grows its first item instead.
    let inner_add = doc
        .children(chosen)
        .into_iter()
        .find(|&c| doc.role(c) == Role::AddControl && !doc.has_class(c, "hidden"));
    if let Some(inner_add) = inner_add {
        if doc.has_class(inner_add, "btn-list") {
            add_list_item(doc, inner_add)?;
        } else {
            add_block(doc, inner_add)?;
        }
    }

    Ok(ChoiceOutcome::Selected { option: chosen })
}

/// Whether any option of a choice group still holds live content. Structural
/// chrome (anchors, selectors, templates) and dormant blocks do not count.
pub fn has_field(doc: &Document, group: NodeId) -> bool {
    for option in doc.descendants_with_class(group, "conditional-option") {
        for child in doc.children(option) {
            if doc.has_class(child, "growing-source") || doc.has_class(child, "deleted") {
                continue;
            }
            if matches!(doc.tag(child), "a" | "select") {
                continue;
            }
            return true;
        }
    }
    false
}

/// After content under a choice option went away, collapse the group back to
/// its selector when nothing live is left. `option` is the container that
/// held the removed content. Returns whether the group collapsed.
pub fn update_choice_container(doc: &mut Document, option: NodeId) -> bool {
    if !doc.has_class(option, "conditional-option") {
        return false;
    }
    let Some(group) = doc.parent(option) else {
        return false;
    };
    if has_field(doc, group) {
        return false;
    }
    let children = doc.children(group);
    if let Some(&selector) = children.first() {
        doc.remove_class(selector, "hidden");
        doc.set_attr(selector, "value", "");
    }
    for node in doc.descendants_with_class(group, "conditional-option") {
        doc.add_class(node, "deleted");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONAL_BLOCK: &str = r##"<div>
        <a class="btn-add" data-target="#test:0:comment"></a>
        <div class="container deleted" id="test:0:comment">
            <a class="btn-delete" data-target="#test:0:comment"></a>
            <textarea name="test:0:comment:value">old text</textarea>
        </div>
    </div>"##;

    const LIST: &str = r##"<div class="list-container" id="list">
        <a class="btn-add btn-list" data-target="#test:0"></a>
        <div class="container" id="test:0">
            <a class="btn-delete btn-list"></a>
            <input name="test:0:value" value="first"/>
        </div>
        <a class="btn-add btn-list" data-target="#test:1"></a>
        <div class="container growing-source" id="test">
            <a class="btn-delete btn-list"></a>
            <input name="test:0:value" value=""/>
        </div>
    </div>"##;

    const CHOICE: &str = r#"<div class="conditional-container" id="group">
        <select class="conditional" id="select" value="">
            <option value=""></option>
            <option value="test:0:sub1"></option>
            <option value="test:0:sub2"></option>
        </select>
        <div class="conditional-option test:0:sub1 deleted" id="test:0:sub1">
            <input name="test:0:sub1:value" value="a"/>
        </div>
        <div class="conditional-option test:0:sub2 deleted" id="test:0:sub2">
            <input name="test:0:sub2:value" value="b"/>
        </div>
    </div>"#;

    fn control_in(doc: &Document, parent: NodeId, role: Role) -> NodeId {
        doc.children(parent)
            .into_iter()
            .find(|&c| doc.role(c) == role)
            .unwrap()
    }

    #[test]
    fn test_add_block_revives_and_hides_control() {
        let mut doc = Document::parse(OPTIONAL_BLOCK).unwrap();
        let control = control_in(&doc, doc.root(), Role::AddControl);
        let block = add_block(&mut doc, control).unwrap();
        assert_eq!(doc.id_attr(block), Some("test:0:comment"));
        assert!(!doc.has_class(block, "deleted"));
        assert!(doc.has_class(control, "hidden"));
        // The dormant field value came back untouched.
        assert!(doc.serialize_form(doc.root()).contains("old+text"));
    }

    #[test]
    fn test_delete_block_keeps_markup_out_of_submit() {
        let mut doc = Document::parse(OPTIONAL_BLOCK).unwrap();
        let add = control_in(&doc, doc.root(), Role::AddControl);
        let block = add_block(&mut doc, add).unwrap();
        let delete = control_in(&doc, block, Role::DeleteControl);
        delete_block(&mut doc, delete).unwrap();
        assert!(doc.has_class(block, "deleted"));
        assert!(!doc.has_class(add, "hidden"));
        assert_eq!(doc.serialize_form(doc.root()), "");
    }

    #[test]
    fn test_add_list_item_at_end() {
        let mut doc = Document::parse(LIST).unwrap();
        let controls: Vec<NodeId> = doc
            .children(doc.root())
            .into_iter()
            .filter(|&c| doc.role(c) == Role::AddControl)
            .collect();
        let insert = add_list_item(&mut doc, controls[1]).unwrap();
        assert_eq!(insert.prefix, "test");
        assert_eq!(insert.index, 1);
        assert_eq!(doc.id_attr(insert.item), Some("test:1"));
        assert!(!doc.has_class(insert.item, "growing-source"));
        let field = doc
            .children(insert.item)
            .into_iter()
            .find(|&c| doc.tag(c) == "input")
            .unwrap();
        assert_eq!(doc.attr(field, "name"), Some("test:1:value"));
        // A fresh control for the next slot follows the item.
        let after = doc.next_sibling(insert.item).unwrap();
        assert_eq!(doc.role(after), Role::AddControl);
        assert_eq!(doc.attr(after, "data-target"), Some("#test:2"));
    }

    #[test]
    fn test_add_list_item_in_front_shifts_tail() {
        let mut doc = Document::parse(LIST).unwrap();
        let first_control = doc.children(doc.root())[0];
        let insert = add_list_item(&mut doc, first_control).unwrap();
        assert_eq!(insert.index, 0);
        let items: Vec<String> = doc
            .children(doc.root())
            .into_iter()
            .filter(|&c| doc.role(c) == Role::ListItem)
            .map(|c| doc.id_attr(c).unwrap().to_string())
            .collect();
        assert_eq!(items, ["test:0", "test:1"]);
        // The old first item carried its value into slot one.
        let doc_markup = doc.serialize_form(doc.root());
        assert!(doc_markup.contains("test%3A1%3Avalue=first"));
    }

    #[test]
    fn test_delete_list_item_shifts_tail_down() {
        let mut doc = Document::parse(LIST).unwrap();
        let first_control = doc.children(doc.root())[0];
        add_list_item(&mut doc, first_control).unwrap();
        // Two items now; drop the first one again.
        let first_item = doc.require_by_id("test:0").unwrap();
        let delete = control_in(&doc, first_item, Role::DeleteControl);
        let removal = delete_list_item(&mut doc, delete).unwrap();
        assert_eq!(removal, ListRemoval { prefix: "test".to_string(), index: 0 });
        let items: Vec<String> = doc
            .children(doc.root())
            .into_iter()
            .filter(|&c| doc.role(c) == Role::ListItem)
            .map(|c| doc.id_attr(c).unwrap().to_string())
            .collect();
        assert_eq!(items, ["test:0"]);
        assert!(doc.serialize_form(doc.root()).contains("test%3A0%3Avalue=first"));
    }

    #[test]
    fn test_choice_switch() {
        let mut doc = Document::parse(CHOICE).unwrap();
        let selector = doc.require_by_id("select").unwrap();
        let outcome = choice_changed(&mut doc, selector, "test:0:sub1").unwrap();
        let sub1 = doc.require_by_id("test:0:sub1").unwrap();
        assert_eq!(outcome, ChoiceOutcome::Selected { option: sub1 });
        assert!(!doc.has_class(sub1, "deleted"));
        assert!(doc.has_class(selector, "hidden"));
        assert_eq!(doc.serialize_form(doc.root()), "test%3A0%3Asub1%3Avalue=a");

        // Switching to the sibling hides the first again.
        choice_changed(&mut doc, selector, "test:0:sub2").unwrap();
        assert!(doc.has_class(sub1, "deleted"));
        assert_eq!(doc.serialize_form(doc.root()), "test%3A0%3Asub2%3Avalue=b");
    }

    #[test]
    fn test_choice_switch_to_list_option_grows_first_item() {
        let markup = r#"<div class="conditional-container" id="group">
            <select class="conditional" id="select" value="">
                <option value=""></option>
                <option value="test:0:items"></option>
            </select>
            <div class="conditional-option test:0:items deleted list-container" id="test:0:items">
                <a class="btn-add btn-list"></a>
                <div class="container growing-source" id="test:0:item">
                    <input name="test:0:item:0:value" value=""/>
                </div>
            </div>
        </div>"#;
        let mut doc = Document::parse(markup).unwrap();
        let selector = doc.require_by_id("select").unwrap();
        choice_changed(&mut doc, selector, "test:0:items").unwrap();
        // The revealed list option starts with one real item.
        let item = doc.require_by_id("test:0:item:0").unwrap();
        assert_eq!(doc.role(item), Role::ListItem);
        assert_eq!(
            doc.serialize_form(doc.root()),
            "test%3A0%3Aitem%3A0%3Avalue="
        );
    }

    #[test]
    fn test_choice_cleared() {
        let mut doc = Document::parse(CHOICE).unwrap();
        let selector = doc.require_by_id("select").unwrap();
        choice_changed(&mut doc, selector, "test:0:sub1").unwrap();
        let outcome = choice_changed(&mut doc, selector, "").unwrap();
        assert_eq!(outcome, ChoiceOutcome::Cleared);
        assert!(!doc.has_class(selector, "hidden"));
        assert_eq!(doc.serialize_form(doc.root()), "");
    }

    #[test]
    fn test_choice_unknown_value() {
        let mut doc = Document::parse(CHOICE).unwrap();
        let selector = doc.require_by_id("select").unwrap();
        assert!(matches!(
            choice_changed(&mut doc, selector, "test:0:sub3"),
            Err(EditError::UnresolvableLocator(_))
        ));
    }

    #[test]
    fn test_group_collapses_when_last_content_goes() {
        let markup = r##"<div class="conditional-container" id="group">
            <select class="conditional hidden" id="select" value="test:0:sub1">
                <option value=""></option>
                <option value="test:0:sub1"></option>
            </select>
            <div class="conditional-option test:0:sub1" id="test:0:sub1">
                <a class="btn-add hidden" data-target="#test:0:sub1:block"></a>
                <div class="container" id="test:0:sub1:block">
                    <a class="btn-delete"></a>
                    <input name="test:0:sub1:block:value" value="x"/>
                </div>
            </div>
        </div>"##;
        let mut doc = Document::parse(markup).unwrap();
        let block = doc.require_by_id("test:0:sub1:block").unwrap();
        let delete = control_in(&doc, block, Role::DeleteControl);
        delete_block(&mut doc, delete).unwrap();

        let selector = doc.require_by_id("select").unwrap();
        let option = doc.require_by_id("test:0:sub1").unwrap();
        assert!(!doc.has_class(selector, "hidden"));
        assert_eq!(doc.attr(selector, "value"), Some(""));
        assert!(doc.has_class(option, "deleted"));
    }

    #[test]
    fn test_group_collapses_when_last_list_item_goes() {
        let markup = r#"<div class="conditional-container" id="group">
            <select class="conditional" id="select" value="">
                <option value=""></option>
                <option value="test:0:items"></option>
            </select>
            <div class="conditional-option test:0:items deleted list-container" id="test:0:items">
                <a class="btn-add btn-list"></a>
                <div class="container growing-source" id="test:0:item">
                    <a class="btn-delete btn-list"></a>
                    <input name="test:0:item:0:value" value=""/>
                </div>
            </div>
        </div>"#;
        let mut doc = Document::parse(markup).unwrap();
        let selector = doc.require_by_id("select").unwrap();
        choice_changed(&mut doc, selector, "test:0:items").unwrap();

        // Deleting the only item leaves the option empty, so the group goes
        // back to its selector.
        let item = doc.require_by_id("test:0:item:0").unwrap();
        let delete = control_in(&doc, item, Role::DeleteControl);
        delete_list_item(&mut doc, delete).unwrap();

        let option = doc.require_by_id("test:0:items").unwrap();
        assert!(!doc.has_class(selector, "hidden"));
        assert_eq!(doc.attr(selector, "value"), Some(""));
        assert!(doc.has_class(option, "deleted"));
        assert_eq!(doc.serialize_form(doc.root()), "");
    }

    #[test]
    fn test_has_field_ignores_chrome() {
        let markup = r#"<div class="conditional-container">
            <select class="conditional"></select>
            <div class="conditional-option x">
                <a class="btn-add"></a>
                <div class="growing-source"></div>
                <div class="deleted"></div>
            </div>
        </div>"#;
        let doc = Document::parse(markup).unwrap();
        assert!(!has_field(&doc, doc.root()));
    }
}

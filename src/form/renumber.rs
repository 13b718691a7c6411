//! Prefix renumbering
//!
//! Inserting, removing or reordering a list item invalidates the positional
//! index baked into every identifier under the list prefix. The
//! [`Renumberer`] rewrites those indices in place, across every attribute the
//! identifiers appear in.
//!
//! Rewriting is anchored and token-wise: only a token that *starts* with
//! `<prefix>:<digits>` is touched (optionally behind `#` and/or `collapse-`),
//! and multi-valued attributes are handled token by token on single-space
//! boundaries so untouched tokens and spacing come back byte-identical.
//! Collapsible-panel references keep their identifiers selector-escaped
//! (`\:`), so every rewrite is also attempted against the escaped spelling
//! and the escaping is preserved in the output.

use regex::Regex;

use crate::form::dom::{Document, NodeId, Role};
use crate::form::ident;

/// Attributes that can carry path identifiers.
pub const RENUMBER_ATTRS: &[&str] = &[
    "name",
    "id",
    "class",
    "value",
    "href",
    "data-comment-name",
    "data-target",
    "data-elt-id",
];

/// How to compute the new index from the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Add a signed offset to the existing index.
    Shift(i64),
    /// Overwrite the index outright.
    Assign(u64),
}

impl Mode {
    fn apply(self, old: u64) -> u64 {
        match self {
            Mode::Shift(diff) => {
                let shifted = old as i64 + diff;
                if shifted < 0 {
                    0
                } else {
                    shifted as u64
                }
            }
            Mode::Assign(index) => index,
        }
    }
}

/// How a sibling run advances its index while being reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Every element is its own slot.
    Single,
    /// Elements come in control/content pairs sharing one slot. `offset` is
    /// the number of leading elements that stand alone before pairing starts.
    Paired { offset: usize },
}

impl Step {
    fn advances(self, position: usize) -> bool {
        match self {
            Step::Single => true,
            Step::Paired { offset } => (position + offset) % 2 == 1,
        }
    }
}

/// Rewrites list indices under one prefix.
pub struct Renumberer {
    prefix: String,
    escaped_prefix: String,
    plain: Regex,
    escaped: Regex,
}

impl Renumberer {
    pub fn new(prefix: &str) -> Self {
        let escaped_prefix = ident::escape(prefix);
        // The leading group keeps `#` and `collapse-` out of the way so the
        // same pattern serves ids, targets and panel references.
        let plain = Regex::new(&format!(
            r"^(#?(?:collapse-)?){}:(\d+)",
            regex::escape(prefix)
        ))
        .unwrap();
        let escaped = Regex::new(&format!(
            r"^(#?(?:collapse-)?){}\\:(\d+)",
            regex::escape(&escaped_prefix)
        ))
        .unwrap();
        Renumberer {
            prefix: prefix.to_string(),
            escaped_prefix,
            plain,
            escaped,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rewrite one token, `None` when the token is not under this prefix.
    pub fn rewrite_token(&self, token: &str, mode: Mode) -> Option<String> {
        if let Some(caps) = self.plain.captures(token) {
            let whole = caps.get(0).unwrap();
            let old: u64 = caps[2].parse().ok()?;
            return Some(format!(
                "{}{}:{}{}",
                &caps[1],
                self.prefix,
                mode.apply(old),
                &token[whole.end()..]
            ));
        }
        if let Some(caps) = self.escaped.captures(token) {
            let whole = caps.get(0).unwrap();
            let old: u64 = caps[2].parse().ok()?;
            return Some(format!(
                "{}{}\\:{}{}",
                &caps[1],
                self.escaped_prefix,
                mode.apply(old),
                &token[whole.end()..]
            ));
        }
        None
    }

    /// Rewrite a whole attribute value token-wise. `None` when no token
    /// matched, so callers can leave the attribute untouched.
    pub fn rewrite_value(&self, value: &str, mode: Mode) -> Option<String> {
        let mut changed = false;
        let tokens: Vec<String> = value
            .split(' ')
            .map(|token| match self.rewrite_token(token, mode) {
                Some(rewritten) => {
                    if rewritten != token {
                        changed = true;
                    }
                    rewritten
                }
                None => token.to_string(),
            })
            .collect();
        if changed {
            Some(tokens.join(" "))
        } else {
            None
        }
    }

    /// Rewrite every identifier-bearing attribute of `node` and its subtree.
    pub fn apply(&self, doc: &mut Document, node: NodeId, mode: Mode) {
        for target in doc.subtree(node) {
            for &attr in RENUMBER_ATTRS {
                if let Some(value) = doc.attr(target, attr) {
                    if let Some(rewritten) = self.rewrite_value(value, mode) {
                        doc.set_attr(target, attr, &rewritten);
                    }
                }
            }
        }
    }

    /// Shift every element of a sibling run by the same offset. List
    /// templates never carry an index and are skipped.
    pub fn shift_run(&self, doc: &mut Document, run: &[NodeId], diff: i64) {
        for &node in run {
            if doc.role(node) == Role::ListTemplate {
                continue;
            }
            self.apply(doc, node, Mode::Shift(diff));
        }
    }

    /// Reassign a sibling run to contiguous indices starting at zero.
    pub fn assign_run(&self, doc: &mut Document, run: &[NodeId], step: Step) {
        let mut index = 0u64;
        for (position, &node) in run.iter().enumerate() {
            if doc.role(node) == Role::ListTemplate {
                continue;
            }
            self.apply(doc, node, Mode::Assign(index));
            if step.advances(position) {
                index += 1;
            }
        }
    }
}

/// Whether `id` addresses something at or under `prefix`.
pub fn is_under_prefix(id: &str, prefix: &str) -> bool {
    id == prefix || (id.starts_with(prefix) && id[prefix.len()..].starts_with(':'))
}

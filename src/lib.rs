//! # formtree
//!
//! A structural editing engine for tree-structured form documents.
//!
//! A document is rendered as a flat form whose fields are named with positional,
//! colon-delimited path identifiers (`root:list_tag:0:tag`), mirrored by a sidebar
//! navigation tree. This crate keeps the three representations consistent while
//! list items and optional subtrees are inserted, deleted, cloned or reordered:
//! it renumbers sibling indices across every attribute occurrence, drives the
//! per-container presence state machines, and translates each structural form
//! edit into a tree command (and each tree drag back into a form edit).
//!
//! The visual tree widget itself is an external collaborator behind the
//! [`TreeWidget`](form::tree::TreeWidget) seam, and the server that supplies
//! fragments for newly added elements sits behind
//! [`Transport`](form::editor::Transport).

pub mod form;

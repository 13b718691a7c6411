//! Error types for structural editing operations

use std::fmt;

/// Errors that can occur while editing the form document or its tree mirror.
///
/// Malformed identifiers are deliberately absent: an identifier without a
/// trailing numeric segment makes the engine operate one prefix level up
/// instead of failing (see [`ident::split_list_id`](super::ident::split_list_id)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// A locator that must resolve to exactly one element matched several.
    AmbiguousLocator(String),
    /// None of the candidate locators resolved to a unique element.
    UnresolvableLocator(String),
    /// A drag-and-drop move requested a position the engine does not support.
    UnsupportedMove(String),
    /// A network round-trip for add/copy/paste failed.
    Network { status: u16, text: String },
    /// A structural edit targeted a subtree with an in-flight network request.
    SubtreeBusy(String),
    /// An add/paste response carried markup the fragment parser rejects.
    MalformedFragment(String),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::AmbiguousLocator(what) => {
                write!(f, "Too many matches for {}", what)
            }
            EditError::UnresolvableLocator(what) => {
                write!(f, "No element found for {}", what)
            }
            EditError::UnsupportedMove(what) => {
                write!(f, "Unsupported move: {}", what)
            }
            EditError::Network { status, text } => {
                write!(f, "{} {}", status, text)
            }
            EditError::SubtreeBusy(prefix) => {
                write!(f, "An operation on {} is still pending", prefix)
            }
            EditError::MalformedFragment(msg) => {
                write!(f, "Malformed markup fragment: {}", msg)
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Type alias for editing results
pub type EditResult<T> = Result<T, EditError>;

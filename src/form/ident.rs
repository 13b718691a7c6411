//! Path identifier parsing and formatting
//!
//! A path identifier is a colon-delimited positional address of a document
//! node, e.g. `root:list_tag:3:tag`. Segments alternate between literal tag
//! names and, for repeatable elements, a non-negative decimal position. The
//! same string doubles as the element's DOM id and form field name, which is
//! why it needs escaping before it can be used as a structural selector.

/// Escape the characters that are structurally significant in selector
/// syntax (`:` and `.`) so an identifier can be used verbatim as a lookup key.
pub fn escape(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if c == ':' || c == '.' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverse of [`escape`]: drop the backslash in front of `:` and `.`.
pub fn unescape(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut chars = id.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some(':') | Some('.')) {
            continue;
        }
        out.push(c);
    }
    out
}

/// The identifier with its trailing `:segment` removed. An identifier without
/// a colon is its own prefix.
pub fn prefix_of(id: &str) -> &str {
    match id.rfind(':') {
        Some(pos) => &id[..pos],
        None => id,
    }
}

/// Parse the trailing segment as a list index.
///
/// `None` is not an error: it means "not a list element" and callers are
/// expected to treat it that way rather than fail.
pub fn index_of(id: &str) -> Option<u64> {
    let last = match id.rfind(':') {
        Some(pos) => &id[pos + 1..],
        None => id,
    };
    last.parse().ok()
}

/// Split a list element identifier like `root:list_tag:0:tag` into the list
/// prefix (`root:list_tag`) and the index (`0`).
///
/// The index is normally the second-to-last segment. When that segment is not
/// numeric the identifier ends at the index itself (`root:list_tag:0`), so we
/// fall back one prefix level and try the last segment instead. Identifiers
/// with no numeric segment in either position yield `None`.
pub fn split_list_id(id: &str) -> Option<(&str, u64)> {
    let without_last = prefix_of(id);
    if without_last.len() < id.len() {
        if let Some(index) = index_of(without_last) {
            return Some((prefix_of(without_last), index));
        }
    }
    index_of(id).map(|index| (without_last, index))
}

/// The first whitespace-separated class token of an element, used as the
/// type tag for same-type sibling detection.
pub fn first_type_tag(classes: &str) -> Option<&str> {
    classes.split_whitespace().next()
}

/// Truncate a text on a word boundary, appending `...`.
///
/// Cuts at the last space within the first `limit` characters; when there is
/// no space to cut at, keeps `limit + 1` characters.
pub fn truncate_label(text: &str, limit: usize) -> String {
    let mut bits: Vec<char> = text.chars().collect();
    if bits.len() <= limit {
        return text.to_string();
    }
    bits.truncate(limit + 1);
    if let Some(cut) = bits.iter().rposition(|&c| c == ' ') {
        bits.truncate(cut);
    }
    bits.push('.');
    bits.push('.');
    bits.push('.');
    bits.into_iter().collect()
}

//! Escaping of user-supplied free text.
//!
//! Review titles, comments and names are escaped before they are stored so
//! that any consumer rendering them as HTML gets inert text.

/// Escape the five HTML-significant characters.
#[must_use]
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

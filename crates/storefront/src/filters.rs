//! Custom Askama template filters.

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Formats a copy count, e.g. `1 copy` or `3 copies`.
///
/// Usage in templates: `{{ item.quantity|copies }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn copies(count: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let count = count.to_string();
    let noun = if count == "1" { "copy" } else { "copies" };
    Ok(format!("{count} {noun}"))
}

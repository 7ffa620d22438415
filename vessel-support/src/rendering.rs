//! Text rendering for human-friendly resolution errors.
//!
//! The engine reports errors in terms of capability type names. Rust's
//! `std::any::type_name` output is fully qualified, which drowns the
//! useful part; these helpers trim it down and format candidate lists.

/// Shortens a fully qualified type name for display by dropping every
/// module path while keeping generics punctuation intact.
///
/// ```
/// use vessel_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<my_app::log::Logger>");
/// assert_eq!(short, "Arc<Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    const PUNCTUATION: [char; 4] = ['<', '>', ',', ' '];

    let mut out = String::with_capacity(full_name.len());
    // every run between punctuation marks is one `::` path
    for piece in full_name.split_inclusive(PUNCTUATION) {
        let (path, mark) = match piece.char_indices().last() {
            Some((at, ch)) if PUNCTUATION.contains(&ch) => (&piece[..at], Some(ch)),
            _ => (piece, None),
        };
        out.push_str(path.rsplit("::").next().unwrap_or(path));
        if let Some(ch) = mark {
            out.push(ch);
        }
    }
    out
}

/// Renders a list of type names as a single comma-separated line,
/// with each name shortened.
///
/// ```
/// use vessel_support::rendering::render_candidates;
///
/// let line = render_candidates(&["app::ConsoleLog", "app::FileLog"]);
/// assert_eq!(line, "ConsoleLog, FileLog");
/// ```
pub fn render_candidates(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| shorten_type_name(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

// src/infrastructure/markdown.rs
use lazy_static::lazy_static;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

lazy_static! {
    static ref NEWLINE_TAG_REGEX: Regex =
        Regex::new(r"\n?(<.+?>)\n?").expect("Failed to compile newline tag regex");
}

/// Render note markdown to an HTML fragment.
///
/// Pure function: embedded `image://<id>` references pass through untouched
/// as `<img src="image://<id>">` and are substituted by the presenter.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, options);

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

/// Same as [`markdown_to_html`] with line breaks around tags removed, for
/// single-line contexts such as list excerpts.
pub fn markdown_to_compact_html(text: &str) -> String {
    NEWLINE_TAG_REGEX
        .replace_all(&markdown_to_html(text), "$1")
        .into_owned()
}

//! Markdown to embeddable HTML.
//!
//! Every render runs the same four stages: angle brackets in the raw text
//! are escaped, the text is parsed as CommonMark with tables, the HTML is
//! cleaned against a fixed allow-list, and bare URLs and emails in the
//! remaining text are turned into links. The sanitizer is the security
//! boundary; nothing rendered here bypasses it except the anchors produced
//! by [`linkify`], which are built from escaped text only.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::{Builder, UrlRelative};
use pulldown_cmark::{Options, Parser, html};
use regex::Regex;

use super::linkify::linkify;

pub(crate) const ALLOWED_TAGS: [&str; 25] = [
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "li",
    "blockquote",
    "pre",
    "code",
    "em",
    "strong",
    "a",
    "img",
    "table",
    "thead",
    "tbody",
    "tr",
    "th",
    "td",
    "br",
    "hr",
];

const URL_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

// Quote markers, each optionally behind list markers on the same line.
static BLOCKQUOTE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?: {0,3}(?:(?:[-*+]|[0-9]{1,9}[.)]) +)*> ?)+").expect("valid regex literal")
});

pub(crate) fn render_markdown(raw: &str) -> String {
    let escaped = escape_angle_brackets(raw);
    let html = markdown_to_html(&escaped);
    let clean = sanitize_html(&html);
    linkify(&clean)
}

/// Escapes `<` everywhere and `>` everywhere except blockquote markers.
/// `&` is kept so entities typed by the author still resolve.
fn escape_angle_brackets(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 8);
    for line in raw.split_inclusive('\n') {
        let marker_end = BLOCKQUOTE_PREFIX
            .find(line)
            .map(|marker| marker.end())
            .unwrap_or(0);
        out.push_str(&line[..marker_end]);
        for ch in line[marker_end..].chars() {
            match ch {
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                _ => out.push(ch),
            }
        }
    }
    out
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn sanitize_html(html: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.into_iter().collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::from([
        ("a", HashSet::from(["href", "title", "rel"])),
        ("img", HashSet::from(["src", "alt", "title"])),
        ("code", HashSet::from(["class"])),
    ]);

    Builder::empty()
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::from(["class"]))
        .url_schemes(URL_SCHEMES.into_iter().collect())
        .url_relative(UrlRelative::Custom(Box::new(same_site_only)))
        // `rel` is author-controlled here, so ammonia must not manage it.
        .link_rel(None)
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(html)
        .to_string()
}

/// Keeps relative references and drops scheme-relative ones (`//host/x`),
/// which point off site. Browsers read a backslash there as a slash.
fn same_site_only(url: &str) -> Option<Cow<'_, str>> {
    let mut lead = url.chars();
    let off_site = matches!(
        (lead.next(), lead.next()),
        (Some('/' | '\\'), Some('/' | '\\'))
    );
    (!off_site).then_some(Cow::Borrowed(url))
}

//! Turns bare URLs and email addresses in sanitized HTML into anchors.
//!
//! Input is the sanitizer's serialization: text is already escaped and
//! attribute values are double-quoted. Text nested in `a`, `pre` or `code`
//! is copied untouched.

use std::sync::LazyLock;

use regex::Regex;

static LINKABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?P<url>https?://(?:[^\s<>"'&]|&amp;)+)"#,
        r"|(?P<email>[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,})",
    ))
    .expect("valid regex literal")
});

const OPAQUE_ELEMENTS: [&str; 3] = ["a", "pre", "code"];

pub(crate) fn linkify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut opaque_depth = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        if rest.starts_with('<') {
            let end = tag_end(rest);
            let tag = &rest[..end];
            match tag_name(tag) {
                Some((name, closing)) if OPAQUE_ELEMENTS.contains(&name.as_str()) => {
                    if closing {
                        opaque_depth = opaque_depth.saturating_sub(1);
                    } else {
                        opaque_depth += 1;
                    }
                }
                _ => {}
            }
            out.push_str(tag);
            rest = &rest[end..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = &rest[..end];
            if opaque_depth == 0 {
                link_text(text, &mut out);
            } else {
                out.push_str(text);
            }
            rest = &rest[end..];
        }
    }

    out
}

/// Byte offset just past the `>` closing the tag at the start of `html`.
fn tag_end(html: &str) -> usize {
    let mut in_quotes = false;
    for (idx, ch) in html.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '>' if !in_quotes => return idx + 1,
            _ => {}
        }
    }
    html.len()
}

fn tag_name(tag: &str) -> Option<(String, bool)> {
    let inner = tag.strip_prefix('<')?;
    let (inner, closing) = match inner.strip_prefix('/') {
        Some(inner) => (inner, true),
        None => (inner, false),
    };
    let name: String = inner
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect();
    if name.is_empty() {
        None
    } else {
        Some((name, closing))
    }
}

fn link_text(text: &str, out: &mut String) {
    let mut last = 0;
    for caps in LINKABLE.captures_iter(text) {
        let (found, href_prefix) = match (caps.name("url"), caps.name("email")) {
            (Some(url), _) => (url, ""),
            (None, Some(email)) => (email, "mailto:"),
            (None, None) => continue,
        };
        let target = if href_prefix.is_empty() {
            trim_url(found.as_str())
        } else {
            found.as_str()
        };
        if href_prefix.is_empty() && target.split_once("://").is_none_or(|(_, rest)| rest.is_empty())
        {
            continue;
        }

        let start = found.start();
        out.push_str(&text[last..start]);
        out.push_str("<a href=\"");
        out.push_str(href_prefix);
        out.push_str(target);
        out.push_str("\" rel=\"nofollow\">");
        out.push_str(target);
        out.push_str("</a>");
        last = start + target.len();
    }
    out.push_str(&text[last..]);
}

/// Drops sentence punctuation and an unbalanced `)` from the end of a URL.
fn trim_url(candidate: &str) -> &str {
    let mut url = candidate;
    while let Some(last) = url.chars().last() {
        let strip = match last {
            '.' | ',' | ':' | '!' | '?' => true,
            ';' => !url.ends_with("&amp;"),
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !strip {
            break;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
    url
}

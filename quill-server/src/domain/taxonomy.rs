use serde::{Deserialize, Serialize};

use super::error::DomainError;

pub(crate) const MAX_TERM_NAME_CHARS: usize = 50;

/// Which shared entity table a name resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TermKind {
    Tag,
    Category,
}

impl TermKind {
    pub(crate) fn field(self) -> &'static str {
        match self {
            TermKind::Tag => "tags",
            TermKind::Category => "categories",
        }
    }
}

/// A persisted tag or category, shared between posts and looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Term {
    pub(crate) id: i64,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TagItem {
    pub(crate) value: String,
}

/// Raw tag input as submitted by the authoring client.
///
/// `Text` is either a comma-separated list or the JSON-encoded output of the
/// tag picker (`[{"value": "rust"}]`) posted as a plain string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagInput {
    Text(String),
    Items(Vec<TagItem>),
}

impl Default for TagInput {
    fn default() -> Self {
        TagInput::Text(String::new())
    }
}

impl TagInput {
    /// Text form kept by drafts, re-parsed on publish.
    pub(crate) fn into_raw(self) -> Result<String, DomainError> {
        match self {
            TagInput::Text(text) => Ok(text),
            TagInput::Items(items) => serde_json::to_string(&items)
                .map_err(|err| DomainError::Unexpected(err.to_string())),
        }
    }
}

pub(crate) fn parse_tag_input(raw: &TagInput) -> Result<Vec<String>, DomainError> {
    match raw {
        TagInput::Items(items) => {
            collect_names(TermKind::Tag, items.iter().map(|item| item.value.as_str()))
        }
        TagInput::Text(text) => {
            let text = text.trim();
            if text.starts_with('[') {
                let items: Vec<TagItem> =
                    serde_json::from_str(text).map_err(|_| DomainError::Validation {
                        field: "tags",
                        message: "must be a list of {\"value\": string} objects",
                    })?;
                collect_names(TermKind::Tag, items.iter().map(|item| item.value.as_str()))
            } else {
                parse_comma_separated(TermKind::Tag, text)
            }
        }
    }
}

pub(crate) fn parse_comma_separated(kind: TermKind, raw: &str) -> Result<Vec<String>, DomainError> {
    collect_names(kind, raw.split(','))
}

// Trimmed, non-empty, first occurrence wins. Names are compared exactly.
fn collect_names<'a>(
    kind: TermKind,
    tokens: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, DomainError> {
    let mut names: Vec<String> = Vec::new();
    for token in tokens {
        let name = token.trim();
        if name.is_empty() || names.iter().any(|seen| seen == name) {
            continue;
        }
        if name.chars().count() > MAX_TERM_NAME_CHARS {
            return Err(DomainError::Validation {
                field: kind.field(),
                message: "names must be at most 50 chars",
            });
        }
        names.push(name.to_string());
    }
    Ok(names)
}

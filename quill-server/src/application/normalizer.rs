//! Resolve-or-create for the shared tag and category tables.
//!
//! Raw author input is parsed into trimmed, deduplicated names (see
//! [`crate::domain::taxonomy`]) and each name is resolved against a
//! [`TermTable`] handle. New rows are created through the same handle, so
//! they commit or roll back with whatever transaction the handle belongs to.

use tracing::debug;

use crate::data::term_repository::TermTable;
use crate::domain::error::DomainError;
use crate::domain::taxonomy::{
    TagInput, Term, TermKind, parse_comma_separated, parse_tag_input,
};

/// Returns the existing entity named `name`, or creates it.
///
/// A unique-name conflict on insert means another writer created the row
/// first; it is retried once as a read, and surfaced if the row is still
/// not visible.
pub(crate) async fn resolve_or_create<T>(table: &mut T, name: &str) -> Result<Term, DomainError>
where
    T: TermTable + ?Sized,
{
    if let Some(term) = table.find_by_name(name).await? {
        return Ok(term);
    }

    match table.insert(name).await {
        Ok(term) => {
            debug!(kind = table.kind().field(), id = term.id, name, "created term");
            Ok(term)
        }
        Err(DomainError::Conflict(reason)) => {
            debug!(kind = table.kind().field(), name, "insert raced, re-reading");
            table
                .find_by_name(name)
                .await?
                .ok_or(DomainError::Conflict(reason))
        }
        Err(err) => Err(err),
    }
}

pub(crate) async fn resolve_all<T>(table: &mut T, names: &[String]) -> Result<Vec<Term>, DomainError>
where
    T: TermTable + ?Sized,
{
    let mut terms = Vec::with_capacity(names.len());
    for name in names {
        terms.push(resolve_or_create(table, name).await?);
    }
    Ok(terms)
}

pub(crate) async fn normalize_tags<T>(table: &mut T, raw: &TagInput) -> Result<Vec<Term>, DomainError>
where
    T: TermTable + ?Sized,
{
    let names = parse_tag_input(raw)?;
    resolve_all(table, &names).await
}

pub(crate) async fn normalize_categories<T>(table: &mut T, raw: &str) -> Result<Vec<Term>, DomainError>
where
    T: TermTable + ?Sized,
{
    let names = parse_comma_separated(TermKind::Category, raw)?;
    resolve_all(table, &names).await
}

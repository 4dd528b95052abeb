use crate::domain::error::DomainError;

pub(crate) mod draft_repository;
pub(crate) mod post_repository;
pub(crate) mod term_table;
pub(crate) mod user_repository;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Lock contention that outlasted the busy timeout. The primary result code
/// sits in the low byte of the extended code sqlx reports.
fn lock_contention(err: &sqlx::Error) -> Option<DomainError> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    let code = db_err.code()?.parse::<i32>().ok()? & 0xff;
    matches!(code, SQLITE_BUSY | SQLITE_LOCKED)
        .then(|| DomainError::Conflict("database is busy, retry the request".to_string()))
}

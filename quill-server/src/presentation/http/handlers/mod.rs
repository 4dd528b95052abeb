pub(crate) mod auth;
pub(crate) mod categories;
pub(crate) mod drafts;
pub(crate) mod posts;

pub(crate) mod draft;
pub(crate) mod error;
pub(crate) mod post;
pub(crate) mod taxonomy;
pub(crate) mod user;

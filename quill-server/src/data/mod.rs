pub(crate) mod draft_repository;
pub(crate) mod post_repository;
pub(crate) mod repositories;
pub(crate) mod term_repository;
pub(crate) mod user_repository;

pub(crate) mod auth_service;
pub(crate) mod blog_service;
pub(crate) mod draft_service;
pub(crate) mod linkify;
pub(crate) mod markdown;
pub(crate) mod normalizer;

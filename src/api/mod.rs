pub(crate) mod admin;
pub(crate) mod assignments;
pub(crate) mod chat;
pub(crate) mod conversations;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;

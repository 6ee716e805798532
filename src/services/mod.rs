pub(crate) mod chat;
pub(crate) mod completion;
pub(crate) mod export;
pub(crate) mod identity;
pub(crate) mod lifecycle;
pub(crate) mod prompts;
pub(crate) mod rate_limit;

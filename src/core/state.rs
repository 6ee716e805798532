use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::{
    AssignmentCatalog, ConversationStore, PgStore, ProgressStore, UserDirectory,
};
use crate::services::chat::ChatService;
use crate::services::completion::{CompletionService, OpenAiCompletionService};
use crate::services::export::{ExportFormatter, MarkdownExportFormatter};
use crate::services::identity::{IdentityResolver, JwtIdentityResolver};
use crate::services::lifecycle::LifecycleService;
use crate::services::rate_limit::{self, RateLimiter};

/// Everything the handlers talk to, behind the seams tests replace.
pub(crate) struct Dependencies {
    pub(crate) conversations: Arc<dyn ConversationStore>,
    pub(crate) catalog: Arc<dyn AssignmentCatalog>,
    pub(crate) progress: Arc<dyn ProgressStore>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) identity: Arc<dyn IdentityResolver>,
    pub(crate) completion: Arc<dyn CompletionService>,
    pub(crate) rate_limiter: Arc<dyn RateLimiter>,
    pub(crate) exporter: Arc<dyn ExportFormatter>,
}

impl Dependencies {
    pub(crate) fn production(
        settings: &Settings,
        pool: PgPool,
        redis: &RedisHandle,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::new(pool));
        Ok(Self {
            conversations: store.clone(),
            catalog: store.clone(),
            progress: store.clone(),
            users: store,
            identity: Arc::new(JwtIdentityResolver::new(settings.clone())?),
            completion: Arc::new(OpenAiCompletionService::from_settings(settings)?),
            rate_limiter: rate_limit::from_settings(settings, redis),
            exporter: Arc::new(MarkdownExportFormatter::new(
                settings.export().frontend_url.clone(),
            )),
        })
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: Option<PgPool>,
    redis: RedisHandle,
    catalog: Arc<dyn AssignmentCatalog>,
    users: Arc<dyn UserDirectory>,
    identity: Arc<dyn IdentityResolver>,
    rate_limiter: Arc<dyn RateLimiter>,
    exporter: Arc<dyn ExportFormatter>,
    lifecycle: LifecycleService,
    chat: ChatService,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: Option<PgPool>,
        redis: RedisHandle,
        deps: Dependencies,
    ) -> Self {
        let lifecycle = LifecycleService::new(
            deps.conversations.clone(),
            deps.catalog.clone(),
            deps.progress,
        );
        let chat = ChatService::new(deps.conversations, deps.completion);

        Self {
            inner: Arc::new(InnerState {
                settings,
                db,
                redis,
                catalog: deps.catalog,
                users: deps.users,
                identity: deps.identity,
                rate_limiter: deps.rate_limiter,
                exporter: deps.exporter,
                lifecycle,
                chat,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// `None` when running against in-memory stores.
    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn catalog(&self) -> &dyn AssignmentCatalog {
        self.inner.catalog.as_ref()
    }

    pub(crate) fn users(&self) -> &dyn UserDirectory {
        self.inner.users.as_ref()
    }

    pub(crate) fn identity(&self) -> &dyn IdentityResolver {
        self.inner.identity.as_ref()
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.inner.rate_limiter.as_ref()
    }

    pub(crate) fn exporter(&self) -> &dyn ExportFormatter {
        self.inner.exporter.as_ref()
    }

    pub(crate) fn lifecycle(&self) -> &LifecycleService {
        &self.inner.lifecycle
    }

    pub(crate) fn chat(&self) -> &ChatService {
        &self.inner.chat
    }
}

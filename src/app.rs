//! Composition root - wires stores, services, workers and the HTTP router.
//!
//! The binary builds everything from [`AppConfig`]; tests build the same
//! graph on in-memory stores with [`Stores::in_memory`].

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use secrecy::SecretString;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::adapters::http::{revenue_router, RevenueAppState};
use crate::adapters::memory::{
    InMemoryCustomerRepository, InMemoryDailyRevenueRepository, InMemoryEventLog,
    InMemoryNotificationRepository, InMemoryTrialRepository,
};
use crate::adapters::notifications::{DeliveryPolicy, DeliveryWorker, NotificationDispatcher};
use crate::adapters::postgres::{
    PostgresCustomerRepository, PostgresDailyRevenueRepository, PostgresEventLog,
    PostgresNotificationRepository, PostgresTrialRepository,
};
use crate::adapters::websocket::LiveBroadcaster;
use crate::application::handlers::revenue::{
    DailyRevenueAggregator, EventApplier, IngestWebhookHandler, ProgressQueryService,
    RecoveryConfig, RecoveryWorker,
};
use crate::application::handlers::trial::{
    ExpirySweepConfig, TrialExpirySweeper, TrialLifecycleEngine,
};
use crate::config::{AppConfig, ServerConfig, ValidationError};
use crate::domain::foundation::{Cents, NotificationId};
use crate::domain::revenue::{BusinessCalendar, EventValidator, WebhookVerifier};
use crate::ports::{
    CustomerRepository, DailyRevenueRepository, IdempotencyStore, NotificationQueue,
    NotificationRepository, NotificationSink, RevenueEventLog, TrialRepository,
};

// ════════════════════════════════════════════════════════════════════════════════
// Stores
// ════════════════════════════════════════════════════════════════════════════════

/// One implementation of every persistence port.
#[derive(Clone)]
pub struct Stores {
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub event_log: Arc<dyn RevenueEventLog>,
    pub trials: Arc<dyn TrialRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub revenue: Arc<dyn DailyRevenueRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Stores {
    /// Process-local stores; nothing survives a restart.
    pub fn in_memory() -> Self {
        let event_log = Arc::new(InMemoryEventLog::new());
        Self {
            idempotency: event_log.clone(),
            event_log,
            trials: Arc::new(InMemoryTrialRepository::new()),
            customers: Arc::new(InMemoryCustomerRepository::new()),
            revenue: Arc::new(InMemoryDailyRevenueRepository::new()),
            notifications: Arc::new(InMemoryNotificationRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let event_log = Arc::new(PostgresEventLog::new(pool.clone()));
        Self {
            idempotency: event_log.clone(),
            event_log,
            trials: Arc::new(PostgresTrialRepository::new(pool.clone())),
            customers: Arc::new(PostgresCustomerRepository::new(pool.clone())),
            revenue: Arc::new(PostgresDailyRevenueRepository::new(pool.clone())),
            notifications: Arc::new(PostgresNotificationRepository::new(pool)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Services
// ════════════════════════════════════════════════════════════════════════════════

/// Everything the services need beyond the stores.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub calendar: BusinessCalendar,
    pub daily_target: Cents,
    pub webhook_secret: SecretString,
    pub signature_tolerance_secs: i64,
    pub week_length_days: u32,
    pub broadcast_capacity: usize,
    pub notification_queue_capacity: usize,
    pub delivery: DeliveryPolicy,
    pub recovery: RecoveryConfig,
    pub expiry: ExpirySweepConfig,
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            calendar: config.revenue.calendar()?,
            daily_target: config.revenue.daily_target()?,
            webhook_secret: config.payment.webhook_secret.clone(),
            signature_tolerance_secs: config.payment.signature_tolerance_secs,
            week_length_days: config.revenue.week_length_days,
            broadcast_capacity: config.workers.broadcast_capacity,
            notification_queue_capacity: config.notifications.queue_capacity,
            delivery: config.notifications.policy(),
            recovery: config.workers.recovery(),
            expiry: config.workers.expiry(),
        })
    }
}

/// The wired application.
pub struct Services {
    pub ingest: Arc<IngestWebhookHandler>,
    pub applier: Arc<EventApplier>,
    pub progress: Arc<ProgressQueryService>,
    pub broadcaster: Arc<LiveBroadcaster>,
    pub notifications: Arc<NotificationDispatcher>,
    pub recovery: Arc<RecoveryWorker>,
    pub expiry: Arc<TrialExpirySweeper>,
    pub delivery: Arc<DeliveryWorker>,
}

impl Services {
    /// Wires the services; the receiver feeds [`Services::spawn_workers`].
    pub fn build(
        stores: &Stores,
        sink: Arc<dyn NotificationSink>,
        settings: ServiceSettings,
    ) -> (Self, mpsc::Receiver<NotificationId>) {
        let broadcaster = Arc::new(LiveBroadcaster::new(settings.broadcast_capacity));
        let (dispatcher, delivery_queue) = NotificationDispatcher::new(
            stores.notifications.clone(),
            settings.notification_queue_capacity,
        );
        let notifications = Arc::new(dispatcher);
        let queue: Arc<dyn NotificationQueue> = notifications.clone();

        let applier = Arc::new(EventApplier::new(
            DailyRevenueAggregator::new(
                stores.revenue.clone(),
                settings.calendar,
                settings.daily_target,
            ),
            TrialLifecycleEngine::new(stores.trials.clone(), stores.customers.clone()),
            stores.event_log.clone(),
            queue.clone(),
            broadcaster.clone(),
        ));

        let verifier = WebhookVerifier::new(settings.webhook_secret)
            .with_tolerance_secs(settings.signature_tolerance_secs);
        let ingest = Arc::new(IngestWebhookHandler::new(
            EventValidator::new(verifier),
            stores.idempotency.clone(),
            applier.clone(),
        ));

        let progress = Arc::new(
            ProgressQueryService::new(
                stores.revenue.clone(),
                stores.trials.clone(),
                settings.calendar,
                settings.daily_target,
            )
            .with_window_days(settings.week_length_days),
        );

        let recovery = Arc::new(RecoveryWorker::new(
            stores.event_log.clone(),
            applier.clone(),
            settings.recovery,
        ));

        let expiry = Arc::new(TrialExpirySweeper::new(
            stores.trials.clone(),
            Arc::new(TrialLifecycleEngine::new(
                stores.trials.clone(),
                stores.customers.clone(),
            )),
            queue,
            settings.expiry,
        ));

        let delivery = Arc::new(DeliveryWorker::new(
            stores.notifications.clone(),
            sink,
            settings.delivery,
        ));

        let services = Self {
            ingest,
            applier,
            progress,
            broadcaster,
            notifications,
            recovery,
            expiry,
            delivery,
        };
        (services, delivery_queue)
    }

    /// Starts recovery, expiry and delivery; each stops when `shutdown` flips.
    pub fn spawn_workers(
        &self,
        delivery_queue: mpsc::Receiver<NotificationId>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let recovery = self.recovery.clone();
        let recovery_shutdown = shutdown.clone();
        let expiry = self.expiry.clone();
        let expiry_shutdown = shutdown.clone();

        info!("Starting background workers");
        vec![
            tokio::spawn(async move { recovery.run(recovery_shutdown).await }),
            tokio::spawn(async move { expiry.run(expiry_shutdown).await }),
            tokio::spawn(self.delivery.clone().run(delivery_queue, shutdown)),
        ]
    }

    pub fn app_state(&self) -> RevenueAppState {
        RevenueAppState {
            ingest: self.ingest.clone(),
            progress: self.progress.clone(),
            broadcaster: self.broadcaster.clone(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Router
// ════════════════════════════════════════════════════════════════════════════════

/// Revenue routes plus the HTTP middleware stack.
pub fn router(services: &Services, server: &ServerConfig) -> Router {
    revenue_router()
        .with_state(services.app_state())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors_layer(&server.cors_origins_list()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok());
    layer.allow_origin(AllowOrigin::list(origins))
}

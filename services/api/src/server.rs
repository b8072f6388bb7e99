use crate::cli::ServeArgs;
use crate::infra::{
    seed_fixture_users, AppState, FsMediaStore, InMemoryCommunityStore, InMemoryEventStore,
    InMemoryUserStore, TokenOverlapSimilarity,
};
use crate::routes::with_engagement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use volunteer_hub::config::AppConfig;
use volunteer_hub::engagement::media::MediaStore;
use volunteer_hub::engagement::EngagementCore;
use volunteer_hub::error::AppError;
use volunteer_hub::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let media: Arc<dyn MediaStore> = Arc::new(FsMediaStore::new(config.media.root.clone()));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        media: media.clone(),
    };

    let events = Arc::new(InMemoryEventStore::default());
    let communities = Arc::new(InMemoryCommunityStore::default());
    let users = Arc::new(InMemoryUserStore::default());
    if args.seed {
        let (owner, first, second) = seed_fixture_users(&users);
        info!(
            owner = %owner.0,
            volunteers = %format!("{}, {}", first.0, second.0),
            "seeded fixture users"
        );
    }
    let similarity = Arc::new(TokenOverlapSimilarity::new(events.clone(), users.clone()));

    let core = Arc::new(EngagementCore::new(
        events,
        communities,
        users,
        similarity,
        media,
    ));

    let app = with_engagement_routes(core)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "community engagement service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

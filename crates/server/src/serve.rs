//! HTTP service with the scan worker and scheduler.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use apalis::prelude::*;
use axum::{Router, extract::DefaultBodyLimit, middleware};
use kyc_api::{AppState, auth_middleware, router as api_router, upload_body_limit};
use kyc_common::Config;
use kyc_core::{
    AvScanService, ClamScanner, KycIntakeService, KycReviewService, RetentionService,
    ScanQueueService,
};
use kyc_db::repositories::UserRepository;
use kyc_queue::{
    AvScanContext, KycJobExecutor, RedisScanQueue, RetryConfig, SchedulerConfig, av_scan_worker,
    run_scheduler,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::cli::ServeArgs;
use crate::{connect_database, scan_storage, storage_manager};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Run the service until a shutdown signal arrives.
pub async fn run(config: Config, args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting kyc-vault server...");

    let db = Arc::new(connect_database(&config).await?);

    info!("Running database migrations...");
    kyc_db::migrate(&db).await?;
    info!("Migrations completed");

    let storage = storage_manager(&config)?;
    // Fail at startup rather than on the first upload
    storage.disk(&config.kyc.disk)?;

    info!("Connecting to Redis...");
    let redis_storage = scan_storage(&config).await?;
    info!("Connected to Redis job queue");

    let scan_queue: ScanQueueService = Arc::new(RedisScanQueue::new(redis_storage.clone()));
    let scan_service = AvScanService::new(
        db.clone(),
        storage.clone(),
        Arc::new(ClamScanner::from_config(&config.kyc)),
        &config.kyc,
    );
    let retention_service = RetentionService::new(db.clone(), storage.clone(), &config.kyc);

    let state = AppState {
        user_repo: UserRepository::new(db.clone()),
        intake_service: KycIntakeService::new(
            db.clone(),
            storage.clone(),
            scan_queue.clone(),
            &config.kyc,
        ),
        review_service: KycReviewService::new(db, storage, &config.kyc),
    };

    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(DefaultBodyLimit::max(upload_body_limit(&config.kyc)))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let mut background = Vec::new();
    if args.no_worker {
        info!("Scan worker and scheduler disabled for this process");
    } else {
        info!("Starting antivirus scan worker...");
        let scan_ctx = AvScanContext::new(
            scan_service.clone(),
            scan_queue,
            RetryConfig::from_config(&config.kyc),
        );

        background.push(tokio::spawn(async move {
            let monitor = Monitor::new().register({
                WorkerBuilder::new("kyc-av-scan")
                    .data(scan_ctx)
                    .backend(redis_storage)
                    .build_fn(av_scan_worker)
            });

            if let Err(e) = monitor.run().await {
                error!(error = %e, "Scan worker failed");
            }
        }));

        let executor = Arc::new(KycJobExecutor::new(retention_service, scan_service));
        background.extend(run_scheduler(&SchedulerConfig::from_config(&config.kyc), executor));
        info!("Scan worker and scheduler started");
    }

    let port = args.port.unwrap_or(config.server.port);
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(host, port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in background {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

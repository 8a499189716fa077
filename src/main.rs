use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultbind::config::Config;
use vaultbind::db::{create_pool, init_db, queries, AppState};
use vaultbind::handlers;
use vaultbind::keys;
use vaultbind::models::Plan;
use vaultbind::scheduler;

#[derive(Parser, Debug)]
#[command(name = "vaultbind")]
#[command(about = "Device-bound software license server")]
struct Cli {
    /// Seed the database with a demo license (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Creates one demo license so a fresh dev setup has something to validate
/// against.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing = queries::list_licenses(&conn).expect("Failed to list licenses");
    if !existing.is_empty() {
        tracing::info!("Database already has licenses, skipping seed");
        return;
    }

    let key = keys::generate_key(&state.license_prefix);
    let now = chrono::Utc::now().timestamp();
    let license = queries::insert_license(&conn, &key, Plan::Monthly, "Demo User", Plan::Monthly.expiry_from(now))
        .expect("Failed to create demo license");

    tracing::info!("============================================");
    tracing::info!("DEMO LICENSE CREATED");
    tracing::info!("Key: {}", license.key);
    tracing::info!("Plan: {}", license.plan);
    tracing::info!("============================================");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultbind=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let admin_secret = if config.admin_secret.is_empty() {
        if !config.dev_mode {
            panic!("ADMIN_SECRET must be set outside dev mode");
        }
        tracing::warn!("ADMIN_SECRET not set, using dev default");
        "dev-secret".to_string()
    } else {
        config.admin_secret.clone()
    };

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        admin_secret,
        license_prefix: config.license_prefix.clone(),
        reactivation_delay_secs: config.reactivation_delay_secs,
    };

    // Re-arm reactivations queued before the last shutdown.
    match scheduler::rearm_pending(&state) {
        Ok(0) => {}
        Ok(count) => tracing::info!("Re-armed {} pending reactivation(s)", count),
        Err(e) => tracing::warn!("Failed to re-arm pending reactivations: {}", e),
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set VAULTBIND_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        .merge(handlers::public_router())
        .merge(handlers::admin_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Vaultbind server listening on {}", addr);

    // ConnectInfo gives handlers the transport peer address, the last
    // resort of the client-IP resolution chain.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}

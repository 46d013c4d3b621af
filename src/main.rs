use entity_engine_core::config;
use entity_engine_core::demo::{self, routes::AppState};
use entity_engine_core::extensions::{Extension, ExtensionContext};
use entity_engine_core::identity::{Principal, RoleHierarchy, SystemIds, TeamHierarchy};
use entity_engine_core::pipeline::{EntityRecord, HookRegistry, KindRegistry};
use entity_engine_core::services::Registry as ServiceRegistry;
use entity_engine_core::{extensions, seed};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config::init();
    let config = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to config/default.toml");
            let raw = std::fs::read_to_string("config/default.toml")
                .expect("no config available from environment or config/default.toml");
            toml::from_str(&raw).expect("config/default.toml is not valid")
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .idle_timeout(std::time::Duration::from_secs(600))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database (connection timed out or refused)");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let system_ids = SystemIds::from_config(&config);
    let system_principal = Principal(system_ids.system);

    let roles = RoleHierarchy::load(&pool)
        .await
        .expect("Failed to load role hierarchy");
    let teams = TeamHierarchy::load(&pool, config.max_team_depth)
        .await
        .expect("Failed to load team hierarchy");

    let mut kinds = KindRegistry::new();
    kinds
        .register(demo::note::description())
        .expect("core kind descriptions are internally consistent");
    let kinds = Arc::new(kinds);

    let permissions = Arc::new(entity_engine_core::permission::PermissionEngine::new(
        pool.clone(),
        system_ids,
        roles,
        teams,
        kinds.clone(),
    ));
    let hooks = Arc::new(HookRegistry::new());

    if config.seed_data {
        let entries = vec![seed::SeedEntry {
            id: seed::seed_id(1),
            attributes: serde_json::json!({ "title": "welcome", "body": "seeded on first boot", "done": false }),
            user_id: None,
            team_id: None,
            permission_references: HashMap::new(),
        }];
        match seed::seed_all(&pool, system_principal.id(), &[(demo::note::Note::kind(), entries)]).await {
            Ok(count) => tracing::info!(rows = count, "seed complete"),
            Err(e) => tracing::error!(error = %e, "seed failed"),
        }
    }

    let enabled = config.enabled_extensions();
    if !enabled.is_empty() {
        let extension_impls: HashMap<String, Arc<dyn Extension>> = HashMap::new();
        let mut ctx = ExtensionContext {
            hooks: Arc::new(Mutex::new(HookRegistry::new())),
            abilities: Arc::new(Mutex::new(extensions::AbilityRegistry::new())),
            kinds: Arc::new(Mutex::new(KindRegistry::new())),
        };
        match extensions::load_all(extension_impls, &mut ctx).await {
            Ok(resolution) => tracing::info!(order = ?resolution.order, "extensions loaded"),
            Err(e) => tracing::error!(error = %e, "extension resolution failed"),
        }
    }

    let service_registry = ServiceRegistry::new();
    service_registry.start_all();

    let notes_manager = Arc::new(demo::build_notes_manager(pool.clone(), permissions.clone(), hooks.clone()));
    let state = AppState { notes: notes_manager };

    let app = demo::routes::router(state).layer(CorsLayer::permissive());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .expect("BIND_ADDR must be a valid socket address");
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");

    service_registry.stop_all();
}

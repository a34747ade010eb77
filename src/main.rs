use anyhow::Result;
use axum::Router;
use config::{AppConfig, BackendKind, CleanupPolicy};
use models::object_key::{ObjectNaming, PublicUrls};
use services::{
    backend::{ImageTable, ObjectStore},
    database,
    image_generator::{ImageGenerator, OpenAiGenerator},
    local_store::LocalObjectStore,
    sqlite_table::SqliteImageTable,
    supabase::{SupabaseClient, SupabaseStorage, SupabaseTable},
};
use state::AppState;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + one-shot flags ---
    let (cfg, args) = AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting vision-gallery: backend={:?} bucket={} folder={} cap={}",
        cfg.backend,
        cfg.bucket,
        cfg.folder,
        cfg.retention_cap
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;
    let naming = ObjectNaming::new(cfg.folder.clone(), cfg.object_prefix.clone());

    // --- Backends ---
    let (store, table, urls, local): (
        Arc<dyn ObjectStore>,
        Arc<dyn ImageTable>,
        PublicUrls,
        Option<LocalObjectStore>,
    ) = match cfg.backend {
        BackendKind::Local => {
            let db = Arc::new(database::connect(&cfg.database_url).await?);

            if args.migrate {
                database::run_migrations(&db).await?;
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            // The schema is idempotent, so a normal start applies it too.
            database::run_migrations(&db).await?;

            tokio::fs::create_dir_all(&cfg.storage_dir).await?;
            let local = LocalObjectStore::new(db.clone(), &cfg.storage_dir, cfg.bucket.clone());
            local.ensure_placeholder(&naming.placeholder_path()).await?;

            let urls = PublicUrls::new(cfg.public_base_url.clone(), cfg.bucket.clone());
            (
                Arc::new(local.clone()) as Arc<dyn ObjectStore>,
                Arc::new(SqliteImageTable::new(db)) as Arc<dyn ImageTable>,
                urls,
                Some(local),
            )
        }
        BackendKind::Supabase => {
            if args.migrate {
                anyhow::bail!("--migrate only applies to the local backend");
            }
            let (url, key) = cfg.supabase_credentials()?;
            let client = SupabaseClient::new(http.clone(), url, key);
            let urls = PublicUrls::new(client.base_url(), cfg.bucket.clone());
            (
                Arc::new(SupabaseStorage::new(client.clone(), cfg.bucket.clone()))
                    as Arc<dyn ObjectStore>,
                Arc::new(SupabaseTable::new(client, cfg.table.clone())) as Arc<dyn ImageTable>,
                urls,
                None,
            )
        }
    };
    tracing::info!("Public URLs: {}", urls.prefix());

    let generator = cfg.openai_api_key.as_ref().map(|key| {
        Arc::new(OpenAiGenerator::new(
            http.clone(),
            cfg.openai_base_url.clone(),
            key.clone(),
            cfg.image_model.clone(),
        )) as Arc<dyn ImageGenerator>
    });
    if generator.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; image generation requests will fail");
    }

    let state = AppState {
        store,
        table,
        generator,
        http,
        naming: Arc::new(naming),
        urls: Arc::new(urls),
        retention: Arc::new(cfg.retention_options()),
        local,
    };

    // --- Handle one-shot cleanup mode ---
    if let Some(policy) = args.cleanup {
        let cleanup = state.cleanup();
        let report = match policy {
            CleanupPolicy::Retention => {
                serde_json::to_string_pretty(&cleanup.enforce_retention().await?)?
            }
            CleanupPolicy::Orphans => {
                serde_json::to_string_pretty(&cleanup.purge_orphans().await?)?
            }
        };
        println!("{}", report);
        return Ok(());
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

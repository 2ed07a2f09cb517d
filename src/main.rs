use leadgate::catalog::Catalog;
use leadgate::handlers;
use leadgate::orm::{Db, apply_migration_files};
use leadgate::router::{AppState, Router, access_log, request_timer};
use leadgate::settings::Settings;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> leadgate::Result<()> {
    let settings = Settings::from_env()?;
    let level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
    log::info!(
        "Recording submissions in {} (UTC{})",
        settings.timezone.name,
        settings.timezone.offset()
    );

    let db = Arc::new(Db::connect(&settings.database_url, settings.max_connections).await?);
    let applied = apply_migration_files(db.clone(), &settings.migrations_dir).await?;
    log::info!("{} migration(s) applied", applied);
    let catalog = Catalog::load(&settings.countries_file)?;

    let mut router = Router::new();
    handlers::routes(&mut router);
    router.add_middleware(request_timer());
    router.add_post_middleware(access_log());
    router.set_app_state(AppState::new(db, settings.clone(), catalog));

    router.run(&settings).await
}

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer};
use anyhow::Context;
use chrono::Utc;
use paperclip::actix::OpenApiExt;
use tracing_actix_web::TracingLogger;

use libraryservice::app_config::{config_app, json_config, path_config, LibraryAppData};
use libraryservice::library_repository::{
    InMemoryLibraryRepository, LibraryRepository, PostgresLibraryRepository,
    PostgresLibraryRepositoryConfig,
};
use libraryservice::mailer::{LogMailer, Mailer, SmtpMailer};
use libraryservice::session::SessionTokens;
use libraryservice::settings::Settings;
use libraryservice::sweeps::{spawn_periodically, OverdueNotificationSweep, UnverifiedAccountSweep};
use libraryservice::telemetry::init_telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry()?;
    let settings = Settings::load()?;

    let repository: Arc<dyn LibraryRepository> = if settings.database.use_in_memory {
        tracing::warn!("Using in memory database, data is lost on restart");
        Arc::new(InMemoryLibraryRepository::default())
    } else {
        Arc::new(
            PostgresLibraryRepository::init(PostgresLibraryRepositoryConfig {
                hostname: settings.database.hostname.clone(),
                username: settings.database.username.clone(),
                password: settings.database.password.clone(),
            })
            .await
            .context("Failed to init postgres")?,
        )
    };

    let mailer: Arc<dyn Mailer> = if settings.smtp.enabled {
        Arc::new(SmtpMailer::new(&settings.smtp)?)
    } else {
        tracing::warn!("SMTP disabled, emails are only logged");
        Arc::new(LogMailer)
    };

    let app_data = LibraryAppData::new(
        repository.clone(),
        mailer.clone(),
        Arc::new(SessionTokens::new(&settings.session)),
        &settings.frontend_url,
    );

    if let Some(admin) = &settings.bootstrap_admin {
        app_data
            .auth_engine
            .ensure_bootstrap_admin(admin, Utc::now())
            .await
            .context("Failed to create bootstrap admin")?;
    }

    spawn_periodically(
        Arc::new(OverdueNotificationSweep::new(repository.clone(), mailer)),
        Duration::from_secs(settings.sweeps.overdue_interval_seconds),
    );
    spawn_periodically(
        Arc::new(UnverifiedAccountSweep::new(repository)),
        Duration::from_secs(settings.sweeps.unverified_interval_seconds),
    );

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.server.host,
        settings.server.port
    );
    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(json_config())
            .app_data(path_config())
            .app_data(app_data.repository.clone())
            .app_data(app_data.sessions.clone())
            .app_data(app_data.auth_engine.clone())
            .app_data(app_data.borrow_engine.clone())
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;

    Ok(())
}

use std::sync::Arc;
use tracing::{info, info_span};
use travisci_builds::application::settings_store::SettingsStore;
use travisci_builds::application::use_cases::list_builds::ListBuildsInteractor;
use travisci_builds::application::use_cases::stream_builds::StreamBuildsInteractor;
use travisci_builds::application::use_cases::watch_build::WatchBuildInteractor;
use travisci_builds::config::AppConfig;
use travisci_builds::domain::external_apis::host::{ErrorApi, SessionStorage};
use travisci_builds::infrastructures::adapters::primary::web::{AppState, create_router};
use travisci_builds::infrastructures::adapters::secondary::external_apis::travis::TravisCiApiClient;
use travisci_builds::infrastructures::adapters::secondary::host::discovery::UrlPatternDiscovery;
use travisci_builds::infrastructures::adapters::secondary::host::error_api::TracingErrorApi;
use travisci_builds::infrastructures::adapters::secondary::host::identity::StaticIdentity;
use travisci_builds::infrastructures::adapters::secondary::host::storage::{
    FileSessionStorage, MemorySessionStorage,
};
use travisci_builds::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let provider = telemetry::init_tracing("travisci-builds")?;

    let (app, file_storage) = {
        let initialize_span = info_span!("initialize");
        let _enter = initialize_span.enter();
        info!("Application starting");

        let file_storage = config
            .session_file
            .as_ref()
            .map(|path| Arc::new(FileSessionStorage::new(path.clone())));
        let storage: Arc<dyn SessionStorage> = match &file_storage {
            Some(file) => Arc::clone(file) as Arc<dyn SessionStorage>,
            None => Arc::new(MemorySessionStorage::default()),
        };
        let settings = Arc::new(SettingsStore::new(storage));
        settings.rehydrate();

        let error_api: Arc<dyn ErrorApi> = Arc::new(TracingErrorApi);
        let api = Arc::new(TravisCiApiClient::new(
            Arc::new(UrlPatternDiscovery::compile(config.discovery_url_pattern.clone())),
            Arc::new(StaticIdentity::new(config.id_token.clone())),
        ));
        let list_builds = Arc::new(ListBuildsInteractor::new(
            Arc::clone(&api),
            Arc::clone(&settings),
            Arc::clone(&error_api),
        ));
        let app_state = Arc::new(AppState {
            settings,
            watch_build: Arc::new(WatchBuildInteractor::new(
                api,
                Arc::clone(&list_builds),
                Arc::clone(&error_api),
                config.poll_interval,
            )),
            stream_builds: Arc::new(StreamBuildsInteractor::new(
                Arc::clone(&list_builds),
                error_api,
                config.poll_interval,
            )),
            list_builds,
        });

        (create_router(app_state), file_storage)
    };

    info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {:?}", e);
            }
        })
        .await?;

    // Settings only live for the session.
    if let Some(file) = file_storage {
        if let Err(e) = file.clear() {
            tracing::warn!("Failed to clear session settings: {}", e);
        }
    }
    info!("Application stopped");
    provider.shutdown()?;
    Ok(())
}

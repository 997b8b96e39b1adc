use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use quaderno::{
    application::{
        access::{AccessPolicy, DefaultAccessPolicy},
        archive::ArchiveService,
        context::ContextAssembler,
        error::AppError,
        feeds::FeedService,
        images::ImageService,
        jobs::{
            JobWorkerContext, SessionSweepContext, process_purge_all_job,
            process_session_sweep_job, session_sweep_schedule,
        },
        pages::{PageEditService, PageService},
        render::{ComrakContentRenderer, ContentRenderer},
        repos::{ImageStore, JobQueue, PageStore, UserStore},
        settings::SettingsService,
        site::SiteService,
        sitemap::SitemapService,
        users::UserService,
    },
    cache::{CacheConfig, CacheStore, ContentResolver, InvalidationEngine, MemoryCacheStore},
    config,
    domain::types::JobType,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        media::MediaStorage,
        telemetry,
    },
};
use tracing::{dispatcher, error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
    } else {
        // Failures before telemetry::init still deserve a line.
        eprintln!("quaderno: {error}");
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or_else(|| config::Command::Serve(Box::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ExportPages(args) => run_export(settings, args).await,
        config::Command::ImportPages(args) => run_import(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;

    // The page tables come from our own migrations; the job queue
    // manages its schema itself.
    PostgresStorage::setup(job_repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let app = build_application_context(http_repositories, &settings)?;

    let monitor_handle =
        spawn_job_monitor(job_repositories, app.job_context, app.sweep_context);

    let result = serve_http(&settings, app.http_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_export(
    settings: config::Settings,
    args: config::ExportArgs,
) -> Result<(), AppError> {
    let (http_repositories, _) = init_repositories(&settings).await?;
    let (_, archive) = build_archive_context(&http_repositories, &settings);

    info!(
        target = "quaderno::export",
        path = %args.file.display(),
        "Starting export"
    );

    let body = archive.export_all().await?;
    tokio::fs::write(&args.file, body)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = "quaderno::export", "Export completed");
    Ok(())
}

async fn run_import(
    settings: config::Settings,
    args: config::ImportArgs,
) -> Result<(), AppError> {
    let (http_repositories, _) = init_repositories(&settings).await?;
    let (wiki_settings, archive) = build_archive_context(&http_repositories, &settings);

    info!(
        target = "quaderno::import",
        path = %args.file.display(),
        merge = args.merge,
        "Starting import"
    );

    let body = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let loaded = wiki_settings.load().await.map_err(AppError::from)?;
    let report = archive.apply_archive(&loaded, &body, args.merge).await?;

    info!(
        target = "quaderno::import",
        saved = report.saved,
        deleted = report.deleted,
        "Import completed"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    job_context: JobWorkerContext,
    sweep_context: SessionSweepContext,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let store: Arc<dyn PageStore> = repositories.clone();
    let user_store: Arc<dyn UserStore> = repositories.clone();
    let image_store: Arc<dyn ImageStore> = repositories.clone();
    let job_queue: Arc<dyn JobQueue> = repositories.clone();

    let access: Arc<dyn AccessPolicy> =
        Arc::new(DefaultAccessPolicy::new(settings.site.admin_emails.clone()));
    let renderer: Arc<dyn ContentRenderer> = Arc::new(ComrakContentRenderer::new());

    let cache_config = CacheConfig::from(&settings.cache);
    let cache_store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(&cache_config));
    let resolver = Arc::new(ContentResolver::new(
        cache_store.clone(),
        cache_config.enabled,
    ));
    let invalidation = Arc::new(InvalidationEngine::new(cache_store, store.clone()));

    let media = Arc::new(
        MediaStorage::new(settings.media.directory.clone())
            .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let base_url = settings.site.base_url.clone();

    let settings_service = Arc::new(SettingsService::new(store.clone()));
    let chrome = Arc::new(ContextAssembler::new(
        store.clone(),
        access.clone(),
        renderer.clone(),
        base_url.clone(),
    ));
    let pages = Arc::new(PageService::new(
        store.clone(),
        access.clone(),
        renderer.clone(),
    ));
    let edits = Arc::new(PageEditService::new(
        store.clone(),
        access.clone(),
        renderer.clone(),
        invalidation.clone(),
    ));
    let site = Arc::new(SiteService::new(store.clone(), access.clone()));
    let feeds = Arc::new(FeedService::new(
        store.clone(),
        access.clone(),
        base_url.clone(),
    ));
    let sitemap = Arc::new(SitemapService::new(store.clone(), base_url));
    let users = Arc::new(UserService::new(
        user_store.clone(),
        access.clone(),
        job_queue.clone(),
    ));
    let images = Arc::new(ImageService::new(
        image_store,
        store.clone(),
        access.clone(),
        media,
    ));
    let archive = Arc::new(ArchiveService::new(
        store.clone(),
        access.clone(),
        renderer.clone(),
        invalidation.clone(),
    ));

    let job_context = JobWorkerContext {
        invalidation: invalidation.clone(),
    };
    let sweep_context = SessionSweepContext { users: user_store };

    let http_state = HttpState {
        settings: settings_service,
        chrome,
        pages,
        edits,
        site,
        feeds,
        sitemap,
        users,
        images,
        archive,
        resolver,
        invalidation,
        jobs: job_queue,
        access,
        store,
        renderer,
        db: repositories,
    };

    Ok(ApplicationContext {
        http_state,
        job_context,
        sweep_context,
    })
}

/// The slice of services the export and import subcommands need. They
/// run against the database directly, so no media storage is opened and
/// no caches are kept warm.
fn build_archive_context(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> (Arc<SettingsService>, Arc<ArchiveService>) {
    let store: Arc<dyn PageStore> = repositories.clone();
    let access: Arc<dyn AccessPolicy> =
        Arc::new(DefaultAccessPolicy::new(settings.site.admin_emails.clone()));
    let renderer: Arc<dyn ContentRenderer> = Arc::new(ComrakContentRenderer::new());

    let cache_store: Arc<dyn CacheStore> =
        Arc::new(MemoryCacheStore::new(&CacheConfig::from(&settings.cache)));
    let invalidation = Arc::new(InvalidationEngine::new(cache_store, store.clone()));

    let wiki_settings = Arc::new(SettingsService::new(store.clone()));
    let archive = Arc::new(ArchiveService::new(store, access, renderer, invalidation));

    (wiki_settings, archive)
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    purge_context: JobWorkerContext,
    sweep_context: SessionSweepContext,
) -> tokio::task::JoinHandle<()> {
    let purge_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::PurgeAll.as_str()),
    );

    // A purge is global, so one at a time is plenty.
    let purge_worker = WorkerBuilder::new("purge-all-worker")
        .concurrency(1)
        .data(purge_context)
        .backend(purge_storage)
        .build_fn(process_purge_all_job);

    let sweep_worker = WorkerBuilder::new("session-sweep-worker")
        .data(sweep_context)
        .backend(CronStream::new(session_sweep_schedule()))
        .build_fn(process_session_sweep_job);

    let monitor = Monitor::new().register(purge_worker).register(sweep_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "quaderno::serve",
        addr = %settings.server.addr,
        "Serving wiki"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

use content_risk_service::config::Config;
use content_risk_service::db::{AlertsDb, AnalysesDb, PostsDb};
use content_risk_service::ingest::platforms::{
    poll_platform, FacebookSource, MediaFetcher, PlatformSource, TwitterSource,
};
use content_risk_service::ingest::{folder_watcher, replay, Ingestor, SourceKind, SourceRegistry};
use content_risk_service::queue::{spawn_workers, AnalysisQueue};
use content_risk_service::realtime::{run_alert_listener, AlertFanout};
use content_risk_service::services::alerting::AlertDispatcher;
use content_risk_service::services::audio::AudioAnalyzer;
use content_risk_service::services::classify::TextClassifier;
use content_risk_service::services::event_bus::{AlertPublisher, AlertSubscriber};
use content_risk_service::services::fusion::FusionWeights;
use content_risk_service::services::keyword_prefilter::KeywordPrefilter;
use content_risk_service::services::pipeline::AnalysisPipeline;
use content_risk_service::services::video::VideoAnalyzer;
use sqlx::postgres::PgPoolOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        "Starting content risk service"
    );

    let pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?,
    );
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;
    tracing::info!("Database migrations applied");

    let posts = Arc::new(PostsDb::new(pool.clone()));
    let analyses = Arc::new(AnalysesDb::new(pool.clone()));
    let alerts = Arc::new(AlertsDb::new(pool.clone()));

    let publisher = AlertPublisher::new(&config.redis_url).await?;
    let queue = AnalysisQueue::new(&config.redis_url).await?;

    let prefilter = Arc::new(KeywordPrefilter::new(
        &config.keywords_en_path,
        &config.keywords_si_path,
    ));
    let classifier = Arc::new(TextClassifier::from_config(&config)?);
    let video = Arc::new(VideoAnalyzer::from_config(&config)?);
    let audio = Arc::new(AudioAnalyzer::from_config(&config, classifier.clone())?);

    let dispatcher = Arc::new(AlertDispatcher::new(
        alerts.clone(),
        Arc::new(publisher),
        config.alert_threshold,
    ));
    let pipeline = Arc::new(AnalysisPipeline::new(
        posts.clone(),
        analyses.clone(),
        dispatcher,
        prefilter,
        classifier,
        video,
        audio,
        FusionWeights {
            text: config.fusion_text_weight,
            video: config.fusion_video_weight,
            audio: config.fusion_audio_weight,
        },
        config.media_root.clone(),
    ));

    // Realtime fan-out: bridge the redis broadcast channel into the local
    // observer set.
    let fanout = AlertFanout::new();
    let subscriber = AlertSubscriber::new(&config.redis_url)?;
    let listener = run_alert_listener(fanout.clone(), subscriber).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let workers = spawn_workers(
        config.analysis_workers,
        queue.clone(),
        pipeline,
        shutdown.clone(),
    );
    tracing::info!(workers = config.analysis_workers, "Analysis worker pool running");

    let ingestor = Arc::new(Ingestor::new(
        posts,
        Arc::new(queue),
        config.media_root.clone(),
    ));
    let registry = Arc::new(SourceRegistry::new());

    start_sources(&config, &registry, &ingestor).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    registry.stop_all().await;
    shutdown.store(true, Ordering::Relaxed);
    for worker in workers {
        let _ = worker.await;
    }
    listener.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Start the folder watcher unconditionally, the replay source when a
/// replay directory is configured, and the platform pollers for each
/// platform with credentials configured.
async fn start_sources(
    config: &Config,
    registry: &SourceRegistry,
    ingestor: &Arc<Ingestor>,
) -> anyhow::Result<()> {
    let watch_dir = config.demo_input_dir.clone();
    let watcher_ingestor = ingestor.clone();
    registry
        .start(SourceKind::FolderWatcher, move |stop| {
            folder_watcher::watch_folder(stop, watcher_ingestor, watch_dir)
        })
        .await?;

    if !config.replay_dir.as_os_str().is_empty() {
        let replay_dir = config.replay_dir.clone();
        let speed = config.replay_speed;
        let limit = config.replay_limit;
        let replay_ingestor = ingestor.clone();
        registry
            .start(SourceKind::Replay, move |stop| {
                replay::replay_dataset(stop, replay_ingestor, replay_dir, speed, limit)
            })
            .await?;
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.inference_timeout_secs))
        .build()?;
    let fetcher = Arc::new(MediaFetcher::new(http.clone(), &config.media_root));

    if !config.twitter_bearer_token.is_empty() {
        let source: Arc<dyn PlatformSource> = Arc::new(TwitterSource::new(
            http.clone(),
            config.twitter_bearer_token.clone(),
            config.twitter_query.clone(),
            config.twitter_poll_limit,
        ));
        let interval = Duration::from_secs(config.twitter_poll_interval_secs);
        let poll_ingestor = ingestor.clone();
        let poll_fetcher = fetcher.clone();
        registry
            .start(SourceKind::TwitterPoll, move |stop| {
                poll_platform(stop, poll_ingestor, source, poll_fetcher, interval)
            })
            .await?;
    } else {
        tracing::info!("Twitter polling disabled, no bearer token configured");
    }

    let page_ids = config.facebook_page_ids_list();
    if !config.facebook_access_token.is_empty() && !page_ids.is_empty() {
        let source: Arc<dyn PlatformSource> = Arc::new(FacebookSource::new(
            http,
            config.facebook_access_token.clone(),
            page_ids,
            config.facebook_poll_limit,
        ));
        let interval = Duration::from_secs(config.facebook_poll_interval_secs);
        let poll_ingestor = ingestor.clone();
        registry
            .start(SourceKind::FacebookPoll, move |stop| {
                poll_platform(stop, poll_ingestor, source, fetcher, interval)
            })
            .await?;
    } else {
        tracing::info!("Facebook polling disabled, no access token or page ids configured");
    }

    Ok(())
}

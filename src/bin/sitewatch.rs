use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sitewatch::{
    cache::{CacheStore, MemoryCache},
    config::{PipelineConfig, SeedFile, read_seed_file},
    email::{EmailSender, MemoryMailer, WebhookMailer},
    queue::{JobQueue, MemoryQueue},
    repo::{MemoryRepository, Repository},
    services::{
        alerting::AlertingHandle, analytics::AnalyticsHandle, retention::RetentionHandle,
        scheduler::SchedulerHandle, worker::WorkerHandle,
    },
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Seed file
    #[arg(short)]
    file: String,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![("sitewatch", LevelFilter::TRACE)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = PipelineConfig::from_env();
    let seed = read_seed_file(&args.file)?;

    let repo = Arc::new(MemoryRepository::new());
    seed_repository(&repo, &seed).await;

    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let mailer: Arc<dyn EmailSender> = match &config.email.webhook_url {
        Some(url) => Arc::new(WebhookMailer::new(
            reqwest::Client::new(),
            url.clone(),
            config.email.from.clone(),
        )),
        None => Arc::new(MemoryMailer::new()),
    };

    // the pipeline refuses to start against unreachable backing services
    cache.ping().await.context("cache is unreachable")?;
    queue.ping().await.context("queue is unreachable")?;
    repo.ping().await.context("repository is unreachable")?;

    let repo: Arc<dyn Repository> = repo;
    let scheduler = SchedulerHandle::spawn(
        config.scheduler,
        repo.clone(),
        cache.clone(),
        queue.clone(),
    );
    let worker = WorkerHandle::spawn(config.worker, repo.clone(), queue.clone());
    let analytics = AnalyticsHandle::spawn(config.analytics, repo.clone());
    let alerting = AlertingHandle::spawn(config.alerting, repo.clone(), cache.clone(), mailer);
    let retention = RetentionHandle::spawn(config.retention, repo.clone());

    info!("monitoring pipeline started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    // producers stop first so the worker can drain what is already queued
    scheduler.shutdown().await;
    alerting.shutdown().await;
    analytics.shutdown().await;
    retention.shutdown().await;
    worker.shutdown().await;

    Ok(())
}

async fn seed_repository(repo: &MemoryRepository, seed: &SeedFile) {
    for user in &seed.users {
        let user_id = repo.seed_user(&user.email).await;
        for monitor in &user.monitors {
            let monitor_id = repo.seed_monitor(&user_id, monitor.active).await;
            for url in &monitor.endpoints {
                repo.seed_endpoint(&monitor_id, url).await;
            }
        }
        debug!("seeded user {} as {user_id}", user.email);
    }
}

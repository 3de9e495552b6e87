use std::sync::Arc;

use anyhow::Context;
use railwatch_core::{
    board::DepartureBoard,
    clock::{Clock, SystemClock},
    config::Config,
    messaging::port::{Inbox, NullInbox},
    monitor::DelayMonitor,
    notify::{DedupSink, NotificationSink, NullSink},
    registry::ServiceRegistry,
    store::{CursorStore, ServiceStore},
    subscription::SubscriptionProcessor,
};
use railwatch_darwin::{DarwinBoard, DarwinConfig};
use railwatch_telegram::TelegramMessenger;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load().context("loading configuration")?;
    let _log_guard = railwatch_core::logging::init("railwatch", cfg.log_file.as_deref())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.timezone));

    let board: Arc<dyn DepartureBoard> = Arc::new(DarwinBoard::new(DarwinConfig {
        base_url: cfg.darwin_base_url.clone(),
        access_token: cfg.darwin_access_token.clone(),
        rows: cfg.darwin_board_rows,
        timeout: cfg.http_timeout,
    })?);

    let (inbox, sink): (Arc<dyn Inbox>, Arc<dyn NotificationSink>) =
        match (&cfg.telegram_bot_token, cfg.telegram_notify_chat_id) {
            (Some(token), Some(chat)) => {
                let telegram = Arc::new(TelegramMessenger::new(
                    token.clone(),
                    chat,
                    cfg.http_timeout,
                    clock.clone(),
                )?);
                let inbox: Arc<dyn Inbox> = telegram.clone();
                let sink: Arc<dyn NotificationSink> = telegram;
                (inbox, sink)
            }
            _ => {
                warn!("TELEGRAM_BOT_TOKEN not set, subscriptions and notifications are disabled");
                let inbox: Arc<dyn Inbox> = Arc::new(NullInbox);
                let sink: Arc<dyn NotificationSink> = Arc::new(NullSink);
                (inbox, sink)
            }
        };
    let sink: Arc<dyn NotificationSink> = Arc::new(DedupSink::new(sink, clock.clone()));

    let registry = ServiceRegistry::load(
        ServiceStore::new(&cfg.services_file),
        cfg.registry_capacity,
    )
    .with_context(|| format!("loading {}", cfg.services_file.display()))?;
    let subscriptions = SubscriptionProcessor::new(
        inbox,
        CursorStore::new(&cfg.cursor_file),
        cfg.retry_policy(),
    );

    let monitor = Arc::new(DelayMonitor::new(
        cfg.monitor_settings(),
        registry,
        subscriptions,
        board,
        sink,
        clock,
    ));

    let cancel = CancellationToken::new();

    let monitor_task = {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    let server_task = cfg.http_enabled.then(|| {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        let addr = cfg.http_bind;
        tokio::spawn(async move {
            if let Err(e) = server::serve(addr, monitor, cancel).await {
                error!(error = %e, "query endpoint failed");
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl+C handler")?;
    info!("shutdown requested");
    cancel.cancel();

    monitor_task.await.context("monitor task panicked")?;
    if let Some(task) = server_task {
        task.await.context("server task panicked")?;
    }
    Ok(())
}

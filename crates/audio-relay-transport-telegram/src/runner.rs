use crate::bot::backend::{ScratchHistory, TelegramForwarder, TelegramNotifier};
use crate::bot::handlers::{setup_handler, DispatchContext};
use crate::bot::resilient::retry_telegram_operation;
use crate::config::{BotSettings, LIVE_FEED_CAPACITY};
use anyhow::{Context, Result};
use audio_relay_core::backend::{HistorySource, Notifier};
use audio_relay_core::commands::CommandSurface;
use audio_relay_core::flow::FlowController;
use audio_relay_core::pipeline::{run_pipeline, PipelineExit, SourcePlan};
use audio_relay_core::rate_limit::{policy_from_settings, RateLimitPolicy};
use audio_relay_core::relay::Relay;
use audio_relay_core::storage::{JsonFileStore, RelayStore};
use audio_relay_core::supervisor::{RestartBackoff, Supervisor};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the relay until interrupted or stopped by the operator.
///
/// Failed attempts are restarted by the supervisor; state and flow control
/// survive restarts.
pub async fn run_relay(settings: Arc<BotSettings>, cancel: CancellationToken) -> PipelineExit {
    let store: Arc<dyn RelayStore> =
        Arc::new(JsonFileStore::open(&settings.relay.state_dir).await);
    let runtime = RelayRuntime {
        bot: Bot::new(settings.telegram.telegram_token.clone()),
        flow: Arc::new(FlowController::new()),
        policy: policy_from_settings(&settings.relay),
        store: store.clone(),
        settings,
    };
    let supervisor = Supervisor::new(RestartBackoff::from_settings(&runtime.settings.relay), store);

    info!("Relay is running...");
    supervisor
        .run(|number| runtime.attempt(number, &cancel), &cancel)
        .await
}

/// Process-lifetime collaborators shared by every pipeline attempt.
struct RelayRuntime {
    settings: Arc<BotSettings>,
    bot: Bot,
    store: Arc<dyn RelayStore>,
    flow: Arc<FlowController>,
    policy: Arc<dyn RateLimitPolicy>,
}

impl RelayRuntime {
    async fn attempt(&self, number: u32, cancel: &CancellationToken) -> Result<PipelineExit> {
        let telegram = &self.settings.telegram;
        let relay_settings = &self.settings.relay;

        let me = retry_telegram_operation(|| async { Ok(self.bot.get_me().await?) })
            .await
            .context("Failed to reach Telegram")?;
        let source = self.resolve(telegram.source_recipient(), "SOURCE").await?;
        let dest = self.resolve(telegram.dest_recipient(), "DEST").await?;
        let history = match telegram.scratch_recipient() {
            Some(scratch) => Some(ScratchHistory::new(
                self.bot.clone(),
                self.resolve(scratch, "SCRATCH_CHAT").await?,
                telegram.history_gap_limit,
            )),
            None => None,
        };

        let source_label = telegram.source.as_deref().unwrap_or_default();
        let dest_label = telegram.dest.as_deref().unwrap_or_default();
        info!(
            attempt = number,
            "👋 Hi {} (@{})",
            me.user.first_name,
            me.user.username.as_deref().unwrap_or("unknown")
        );
        info!("Forwarding from: {} ({})", source_label, source);
        info!("Forwarding to: {} ({})", dest_label, dest);
        info!(
            "Mode: START_MODE={} | BACKFILL={}",
            relay_settings.start_mode.as_str(),
            relay_settings.backfill
        );

        let notifier = TelegramNotifier::new(self.bot.clone(), telegram.owner_chat());
        let greeting = format!("🚀 Started forwarding from {source_label} → {dest_label}");
        if let Err(e) = notifier.notify(&greeting).await {
            warn!("Failed to send start notice: {}", e);
        }

        let (feed_tx, mut feed_rx) = mpsc::channel(LIVE_FEED_CAPACITY);
        let context = Arc::new(DispatchContext {
            source,
            feed: feed_tx,
            commands: Arc::new(CommandSurface::new(
                telegram.owner_chat().0,
                source.0,
                self.flow.clone(),
                self.store.clone(),
            )),
        });
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), setup_handler())
            .dependencies(dptree::deps![context])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();
        let listener = tokio::spawn(async move { dispatcher.dispatch().await });

        let relay = Relay::new(
            Arc::new(TelegramForwarder::new(self.bot.clone(), dest)),
            self.store.clone(),
            self.flow.clone(),
            self.policy.clone(),
            relay_settings.batch_size,
        );
        let plan = SourcePlan {
            channel_id: source.0,
            backfill: relay_settings.backfill,
            start_mode: relay_settings.start_mode,
            page_size: telegram.history_page_size,
        };
        let result = run_pipeline(
            &relay,
            history.as_ref().map(|h| h as &dyn HistorySource),
            &notifier,
            &mut feed_rx,
            &plan,
            cancel,
        )
        .await;

        match shutdown.shutdown() {
            Ok(stopped) => stopped.await,
            Err(_) => listener.abort(),
        }
        Ok(result?)
    }

    async fn resolve(&self, chat: Recipient, key: &str) -> Result<ChatId> {
        let info =
            retry_telegram_operation(|| async { Ok(self.bot.get_chat(chat.clone()).await?) })
                .await
                .with_context(|| format!("Failed to resolve {key}"))?;
        Ok(info.id)
    }
}

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use lvwatch::commands::CommandHandler;
use lvwatch::config::{ConfigHandle, ServiceConfig, Settings, Transport};
use lvwatch::dispatch::Dispatcher;
use lvwatch::feed::LvFeed;
use lvwatch::llm::LlmTranslator;
use lvwatch::logging;
use lvwatch::messaging::{MessagingHost, OneBotHost, SlackHost};
use lvwatch::monitor::Monitor;
use lvwatch::render::HtmlRenderer;
use lvwatch::scheduler::Scheduler;
use lvwatch::store::{ArticleStore, DocumentStore, MonitorState};
use lvwatch::web::{self, AppState};
use lvwatch::LLMParams;

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let service = ServiceConfig::from_env()?;
    let mut settings = Settings::from_env();

    let documents = DocumentStore::new(&service.data_dir);
    if let Some(state) = MonitorState::load(&documents).await {
        info!("Restoring persisted monitor state (enabled: {})", state.enabled);
        settings.monitor.enabled = state.enabled;
    }
    let config = ConfigHandle::new(settings);

    // Inbound commands always arrive through OneBot, so replies use it as well.
    let onebot = Arc::new(OneBotHost::new(
        service.onebot_api_url.clone(),
        service.onebot_access_token.clone(),
    ));
    let broadcast_host: Arc<dyn MessagingHost> = match service.transport {
        Transport::OneBot => onebot.clone(),
        Transport::Slack => Arc::new(SlackHost::new(
            service
                .slack_token
                .clone()
                .context("SLACK_TOKEN environment variable required")?,
        )),
    };
    info!("Broadcasting through {}", broadcast_host.name());

    let feed = Arc::new(LvFeed::new(service.api_url.clone())?);
    let mut monitor = Monitor::new(
        config.clone(),
        ArticleStore::new(documents.clone()),
        feed,
        Dispatcher::new(Some(broadcast_host)),
    );
    match &service.llm {
        Some(llm) => {
            info!("Translating articles with model {}", llm.model);
            monitor = monitor.with_translator(Arc::new(LlmTranslator::new(LLMParams::from_settings(llm))));
        }
        None => info!("No LLM configured, articles are sent untranslated"),
    }
    match &service.render_endpoint {
        Some(endpoint) => {
            info!("Rendering cards through {}", endpoint);
            monitor = monitor.with_renderer(Arc::new(HtmlRenderer::new(endpoint.clone())));
        }
        None => info!("No render endpoint configured, articles are sent as plain text"),
    }
    let monitor = Arc::new(monitor);

    let scheduler = Scheduler::new(monitor.clone());
    if config.snapshot().monitor.enabled {
        scheduler.start();
    } else {
        info!("Monitoring disabled, send `lv start` to enable it");
    }

    let state = AppState {
        handler: CommandHandler::new(monitor, scheduler, documents),
        host: onebot,
    };
    web::serve(service.port, state).await
}

//! Operator commands: `lv start`, `lv stop` and `lv check`.

use std::sync::Arc;
use tracing::{error, info};

use crate::dispatch::Origin;
use crate::monitor::{CheckOutcome, Monitor, Trigger};
use crate::scheduler::Scheduler;
use crate::store::{DocumentStore, MonitorState};

const COMMAND_PREFIX: &str = "lv";
const USAGE: &str = "Usage: lv start | lv stop | lv check";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Check,
    Help,
}

impl Command {
    /// Parses a chat message. Returns `None` for anything not addressed to `lv`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('/').unwrap_or(text);
        let mut words = text.split_whitespace();

        if !words.next()?.eq_ignore_ascii_case(COMMAND_PREFIX) {
            return None;
        }
        let command = match words.next().map(|w| w.to_lowercase()).as_deref() {
            Some("start") => Command::Start,
            Some("stop") => Command::Stop,
            Some("check") => Command::Check,
            _ => Command::Help,
        };
        Some(command)
    }
}

/// Text sent back to the requester once a manual check finishes.
pub fn outcome_message(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::AlreadyRunning => "A check is already running, try again shortly.".to_string(),
        CheckOutcome::NoNewArticles => "No new articles.".to_string(),
        CheckOutcome::Delivered { articles, .. } => {
            format!("Check complete, {} new articles sent.", articles)
        }
        CheckOutcome::Failed(e) => format!("Check failed: {}", e),
    }
}

#[derive(Clone)]
pub struct CommandHandler {
    monitor: Arc<Monitor>,
    scheduler: Scheduler,
    documents: DocumentStore,
}

impl CommandHandler {
    pub fn new(monitor: Arc<Monitor>, scheduler: Scheduler, documents: DocumentStore) -> Self {
        Self {
            monitor,
            scheduler,
            documents,
        }
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn handle(&self, command: Command, origin: &Origin) {
        info!("Handling {:?} from {}", command, origin.target);
        match command {
            Command::Start => self.start(origin).await,
            Command::Stop => self.stop(origin).await,
            Command::Check => self.check(origin).await,
            Command::Help => origin.reply(USAGE).await,
        }
    }

    async fn start(&self, origin: &Origin) {
        self.monitor.config().set_monitor_enabled(true);
        self.persist(true).await;
        self.scheduler.start();

        let interval = self.monitor.config().snapshot().monitor.interval;
        origin
            .reply(&format!(
                "80.lv monitoring started, checking every {} seconds.",
                interval.as_secs()
            ))
            .await;
    }

    async fn stop(&self, origin: &Origin) {
        self.monitor.config().set_monitor_enabled(false);
        self.persist(false).await;
        origin.reply("80.lv monitoring stopped.").await;
    }

    async fn check(&self, origin: &Origin) {
        let per_page = self.monitor.config().snapshot().network.per_page;
        origin
            .reply(&format!("Checking 80.lv for updates (limit {})...", per_page))
            .await;

        let outcome = self
            .monitor
            .check_for_updates(Trigger::Manual(origin.clone()))
            .await;
        origin.reply(&outcome_message(&outcome)).await;
    }

    async fn persist(&self, enabled: bool) {
        if let Err(e) = (MonitorState { enabled }).save(&self.documents).await {
            error!("Failed to persist monitor state: {:#}", e);
        }
    }
}

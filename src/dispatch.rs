//! Delivery of a batch of rendered articles.
//!
//! A batch is either folded into one grouped message per destination or unfolded into
//! one message per article, paced by the configured send interval.

use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::message::RenderedItem;
use crate::messaging::{DispatchTarget, GroupMetadata, MessagingHost};
use crate::TARGET_DISPATCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Fold,
    Unfold,
}

/// Folds only when the batch exceeds the threshold and the transport can send grouped
/// messages to the destination.
pub fn delivery_mode(batch_size: usize, fold_threshold: usize, grouped_supported: bool) -> DeliveryMode {
    if grouped_supported && batch_size > fold_threshold {
        DeliveryMode::Fold
    } else {
        DeliveryMode::Unfold
    }
}

/// The conversation a manual check was requested from, and the transport it came in on.
#[derive(Clone)]
pub struct Origin {
    pub target: DispatchTarget,
    pub host: Arc<dyn MessagingHost>,
}

impl Origin {
    pub fn new(target: DispatchTarget, host: Arc<dyn MessagingHost>) -> Self {
        Self { target, host }
    }

    /// Best-effort text reply to the requester.
    pub async fn reply(&self, text: &str) {
        if let Err(e) = self.host.send_text(&self.target, text).await {
            warn!(target: TARGET_DISPATCH, "Failed to reply to {}: {:#}", self.target, e);
        }
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("target", &self.target)
            .field("host", &self.host.name())
            .finish()
    }
}

/// Per-destination results of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub folded: usize,
    pub unfolded: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.folded + self.unfolded
    }

    fn record(&mut self, mode: DeliveryMode) {
        match mode {
            DeliveryMode::Fold => self.folded += 1,
            DeliveryMode::Unfold => self.unfolded += 1,
        }
    }
}

pub struct Dispatcher {
    broadcast_host: Option<Arc<dyn MessagingHost>>,
}

impl Dispatcher {
    pub fn new(broadcast_host: Option<Arc<dyn MessagingHost>>) -> Self {
        Self { broadcast_host }
    }

    /// Delivers `items` to the requester when `origin` is set, otherwise to every
    /// configured receiver.
    ///
    /// A failure delivering to the origin is returned. Broadcast failures are logged and
    /// counted so one unreachable receiver does not starve the others.
    pub async fn dispatch(
        &self,
        items: &[RenderedItem],
        origin: Option<&Origin>,
        settings: &Settings,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        if let Some(origin) = origin {
            let mode = deliver(origin.host.as_ref(), &origin.target, items, settings).await?;
            report.record(mode);
            return Ok(report);
        }

        let receivers = &settings.monitor.receivers;
        if receivers.is_empty() {
            info!(target: TARGET_DISPATCH, "No receivers configured, dropping {} articles", items.len());
            return Ok(report);
        }
        let Some(host) = self.broadcast_host.as_deref() else {
            warn!(target: TARGET_DISPATCH, "No broadcast transport configured, dropping {} articles", items.len());
            return Ok(report);
        };

        for target in receivers.targets() {
            match deliver(host, &target, items, settings).await {
                Ok(mode) => report.record(mode),
                Err(e) => {
                    error!(target: TARGET_DISPATCH, "Failed to deliver to {}: {:#}", target, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

async fn deliver(
    host: &dyn MessagingHost,
    target: &DispatchTarget,
    items: &[RenderedItem],
    settings: &Settings,
) -> Result<DeliveryMode> {
    let mode = delivery_mode(
        items.len(),
        settings.display.fold_threshold,
        host.supports_grouped(target),
    );
    debug!(target: TARGET_DISPATCH, "Delivering {} articles to {} via {} ({:?})", items.len(), target, host.name(), mode);

    match mode {
        DeliveryMode::Fold => {
            host.send_grouped(target, items, &GroupMetadata::for_batch(items.len()))
                .await?;
        }
        DeliveryMode::Unfold => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sleep(settings.network.send_interval).await;
                }
                host.send(target, item).await?;
            }
        }
    }
    info!(target: TARGET_DISPATCH, "Delivered {} articles to {}", items.len(), target);
    Ok(mode)
}

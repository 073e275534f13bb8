//! In-memory collaborators used by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::article::ArticleRecord;
use crate::feed::FeedSource;
use crate::llm::{Translation, Translator};
use crate::message::RenderedItem;
use crate::messaging::{DispatchTarget, GroupMetadata, MessagingHost};
use crate::render::{CardData, Renderer};

pub fn record(id: &str, title: &str) -> ArticleRecord {
    ArticleRecord {
        id: id.to_string(),
        title: title.to_string(),
        slug: format!("article-{}", id),
        ..Default::default()
    }
}

pub fn items(count: usize) -> Vec<RenderedItem> {
    (0..count)
        .map(|i| RenderedItem::Plain {
            title: format!("Article {}", i),
            url: format!("https://80.lv/articles/article-{}", i),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Single { target: DispatchTarget, item: RenderedItem },
    Text { target: DispatchTarget, text: String },
    Grouped { target: DispatchTarget, items: Vec<RenderedItem> },
}

pub struct FakeHost {
    grouped: bool,
    failing: HashSet<DispatchTarget>,
    calls: Mutex<Vec<HostCall>>,
    send_times: Mutex<Vec<Instant>>,
}

impl FakeHost {
    pub fn new(grouped: bool) -> Self {
        Self {
            grouped,
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            send_times: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, target: DispatchTarget) -> Self {
        self.failing.insert(target);
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Article deliveries only, excluding text replies.
    pub fn article_calls(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, HostCall::Text { .. }))
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.send_times.lock().unwrap().clone()
    }

    fn check(&self, target: &DispatchTarget) -> Result<()> {
        if self.failing.contains(target) {
            anyhow::bail!("simulated failure for {}", target);
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingHost for FakeHost {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_grouped(&self, _destination: &DispatchTarget) -> bool {
        self.grouped
    }

    async fn send(&self, destination: &DispatchTarget, item: &RenderedItem) -> Result<()> {
        self.check(destination)?;
        self.send_times.lock().unwrap().push(Instant::now());
        self.calls.lock().unwrap().push(HostCall::Single {
            target: destination.clone(),
            item: item.clone(),
        });
        Ok(())
    }

    async fn send_text(&self, destination: &DispatchTarget, text: &str) -> Result<()> {
        self.calls.lock().unwrap().push(HostCall::Text {
            target: destination.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_grouped(
        &self,
        destination: &DispatchTarget,
        items: &[RenderedItem],
        _metadata: &GroupMetadata,
    ) -> Result<()> {
        self.check(destination)?;
        self.calls.lock().unwrap().push(HostCall::Grouped {
            target: destination.clone(),
            items: items.to_vec(),
        });
        Ok(())
    }
}

/// Feed returning a fixed page. When gated, `fetch` waits until [`FakeFeed::release`].
pub struct FakeFeed {
    records: Mutex<Vec<ArticleRecord>>,
    fetches: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeFeed {
    pub fn new(records: Vec<ArticleRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fetches: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Returns the feed plus (entered, release) notifiers.
    pub fn gated(records: Vec<ArticleRecord>) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut feed = Self::new(records);
        feed.gate = Some((entered.clone(), release.clone()));
        (feed, entered, release)
    }

    pub fn set_records(&self, records: Vec<ArticleRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    // Ignores the limit so callers' own clamping is exercised.
    async fn fetch(&self, _page: usize, _limit: usize) -> Vec<ArticleRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        self.records.lock().unwrap().clone()
    }
}

/// Prefixes titles with `[zh]`, or fails for the listed titles.
pub struct FakeTranslator {
    failing_titles: HashSet<String>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self {
            failing_titles: HashSet::new(),
        }
    }

    pub fn failing_for(mut self, title: &str) -> Self {
        self.failing_titles.insert(title.to_string());
        self
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, title: &str, excerpt: &str) -> Result<Translation> {
        if self.failing_titles.contains(title) {
            anyhow::bail!("translation unavailable");
        }
        Ok(Translation {
            title: format!("[zh] {}", title),
            excerpt: excerpt.to_string(),
        })
    }
}

/// Renders `https://render/{title}.png`, or fails for the listed titles.
pub struct FakeRenderer {
    failing_titles: HashSet<String>,
    panics: bool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            failing_titles: HashSet::new(),
            panics: false,
        }
    }

    pub fn failing_for(mut self, title: &str) -> Self {
        self.failing_titles.insert(title.to_string());
        self
    }

    pub fn panicking() -> Self {
        Self {
            failing_titles: HashSet::new(),
            panics: true,
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, card: &CardData) -> Result<String> {
        if self.panics {
            panic!("renderer exploded");
        }
        if self.failing_titles.contains(&card.title) {
            anyhow::bail!("render service unavailable");
        }
        Ok(format!("https://render/{}.png", card.title))
    }
}

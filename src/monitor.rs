//! Update detection: fetch, deduplicate, filter, persist, enrich, render and dispatch.
//!
//! At most one cycle runs at a time. The scheduled loop and manual checks share the same
//! [`Monitor`], and a check issued while another is in flight returns
//! [`CheckOutcome::AlreadyRunning`] without touching the store.

use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::article::ArticleRecord;
use crate::config::{ConfigHandle, Settings};
use crate::dispatch::{DispatchReport, Dispatcher, Origin};
use crate::feed::FeedSource;
use crate::filter::should_keep;
use crate::llm::Translator;
use crate::message::RenderedItem;
use crate::render::{CardData, Renderer};
use crate::store::{dedupe_by_id, merge_known, ArticleStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Checking,
}

/// What started a cycle.
#[derive(Debug, Clone)]
pub enum Trigger {
    Scheduled,
    /// An operator asked from this conversation; results go back there only.
    Manual(Origin),
}

impl Trigger {
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Trigger::Scheduled => None,
            Trigger::Manual(origin) => Some(origin),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Trigger::Manual(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    AlreadyRunning,
    NoNewArticles,
    Delivered {
        articles: usize,
        report: DispatchReport,
    },
    Failed(String),
}

/// Resets the cycle state to idle however the cycle ends.
struct CycleGuard<'a> {
    state: &'a Mutex<CycleState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = CycleState::Idle;
    }
}

pub struct Monitor {
    state: Mutex<CycleState>,
    config: ConfigHandle,
    store: ArticleStore,
    feed: Arc<dyn FeedSource>,
    translator: Option<Arc<dyn Translator>>,
    renderer: Option<Arc<dyn Renderer>>,
    dispatcher: Dispatcher,
}

impl Monitor {
    pub fn new(
        config: ConfigHandle,
        store: ArticleStore,
        feed: Arc<dyn FeedSource>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            state: Mutex::new(CycleState::Idle),
            config,
            store,
            feed,
            translator: None,
            renderer: None,
            dispatcher,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            CycleState::Checking => None,
            CycleState::Idle => {
                *state = CycleState::Checking;
                Some(CycleGuard { state: &self.state })
            }
        }
    }

    /// Runs one check cycle unless another is already in progress.
    ///
    /// Errors and panics inside the cycle are logged and reported as
    /// [`CheckOutcome::Failed`]; the monitor is idle again when this returns.
    pub async fn check_for_updates(&self, trigger: Trigger) -> CheckOutcome {
        let Some(_guard) = self.try_begin() else {
            info!("Check already in progress, ignoring {} trigger", trigger_name(&trigger));
            return CheckOutcome::AlreadyRunning;
        };

        let settings = self.config.snapshot();
        let cycle = self.run_cycle(&settings, trigger.origin());

        match AssertUnwindSafe(cycle).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Check cycle ({}) failed: {:?}", trigger_name(&trigger), e);
                CheckOutcome::Failed(format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Check cycle ({}) panicked: {}", trigger_name(&trigger), message);
                CheckOutcome::Failed(message)
            }
        }
    }

    async fn run_cycle(&self, settings: &Settings, origin: Option<&Origin>) -> Result<CheckOutcome> {
        let per_page = settings.network.per_page;

        let known = self.store.load().await;
        let known_ids: HashSet<String> = known.iter().map(|r| r.id.clone()).collect();

        let mut fetched = self.feed.fetch(1, per_page).await;
        fetched.retain(ArticleRecord::is_valid);
        let mut fetched = dedupe_by_id(fetched);
        fetched.truncate(per_page);
        debug!("Fetched {} articles, {} already known", fetched.len(), known_ids.len());

        let mut candidates: Vec<ArticleRecord> = fetched
            .iter()
            .filter(|r| !known_ids.contains(&r.id) && should_keep(r, &settings.filter))
            .cloned()
            .collect();

        // Everything fetched counts as seen, whether or not it passed the filters.
        let merged = merge_known(&fetched, known);
        self.store.save(&merged).await?;

        if candidates.is_empty() {
            debug!("No new articles");
            return Ok(CheckOutcome::NoNewArticles);
        }
        candidates.truncate(per_page);

        info!("Found {} new articles, translating and sending", candidates.len());

        let mut items = Vec::with_capacity(candidates.len());
        for article in candidates {
            let article = self.enrich(article).await;
            items.push(self.render_item(&article, settings).await);
        }

        let report = self.dispatcher.dispatch(&items, origin, settings).await?;
        Ok(CheckOutcome::Delivered {
            articles: items.len(),
            report,
        })
    }

    /// Replaces title and excerpt with their translations; keeps the originals on failure.
    pub async fn enrich(&self, mut article: ArticleRecord) -> ArticleRecord {
        let Some(translator) = &self.translator else {
            return article;
        };
        match translator.translate(&article.title, &article.excerpt).await {
            Ok(translation) => {
                article.title = translation.title;
                article.excerpt = translation.excerpt;
            }
            Err(e) => {
                warn!("Translation failed for article {}, keeping original text: {:#}", article.id, e);
            }
        }
        article
    }

    /// Renders a card, or falls back to a plain-text item of title and link.
    pub async fn render_item(&self, article: &ArticleRecord, settings: &Settings) -> RenderedItem {
        let url = article.url();
        let plain = || RenderedItem::Plain {
            title: article.title.clone(),
            url: url.clone(),
        };

        let Some(renderer) = &self.renderer else {
            return plain();
        };
        let card = CardData::from_record(article, &settings.display);
        match renderer.render(&card).await {
            Ok(image) => RenderedItem::Card {
                image,
                url: url.clone(),
            },
            Err(e) => {
                error!("Card rendering failed for article {}: {:#}", article.id, e);
                plain()
            }
        }
    }
}

fn trigger_name(trigger: &Trigger) -> &'static str {
    if trigger.is_manual() {
        "manual"
    } else {
        "scheduled"
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "check cycle panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Receivers;
    use crate::messaging::DispatchTarget;
    use crate::store::{DocumentStore, KNOWN_ARTICLES_CAP};
    use crate::testing::{record, FakeFeed, FakeHost, FakeRenderer, FakeTranslator, HostCall};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: ArticleStore,
        host: Arc<FakeHost>,
        config: ConfigHandle,
    }

    fn fixture(per_page: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(DocumentStore::new(dir.path()));
        let mut settings = Settings::default();
        settings.network.per_page = per_page;
        settings.display.fold_threshold = 2;
        settings.monitor.receivers = Receivers {
            groups: vec!["100".to_string()],
            users: Vec::new(),
        };
        Fixture {
            _dir: dir,
            store,
            host: Arc::new(FakeHost::new(true)),
            config: ConfigHandle::new(settings),
        }
    }

    fn monitor(f: &Fixture, feed: Arc<FakeFeed>) -> Monitor {
        Monitor::new(
            f.config.clone(),
            f.store.clone(),
            feed,
            Dispatcher::new(Some(f.host.clone())),
        )
    }

    fn ids(records: &[ArticleRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_article_detected_and_log_merged() {
        let f = fixture(10);
        f.store.save(&[record("1", "old")]).await.unwrap();
        let feed = Arc::new(FakeFeed::new(vec![record("1", "A"), record("2", "B")]));
        let monitor = monitor(&f, feed);

        let outcome = monitor.check_for_updates(Trigger::Scheduled).await;

        assert!(matches!(outcome, CheckOutcome::Delivered { articles: 1, .. }));
        let sent = f.host.article_calls();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            HostCall::Single { item: RenderedItem::Plain { title, .. }, .. } if title == "B"
        ));

        let log = f.store.load().await;
        assert_eq!(ids(&log), vec!["1", "2"]);
        assert_eq!(log[0].title, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_articles_are_still_recorded_as_seen() {
        let f = fixture(10);
        f.config.update(|s| s.filter.exclude_keywords = vec!["sponsored".to_string()]);
        let feed = Arc::new(FakeFeed::new(vec![record("9", "Sponsored post")]));
        let monitor = monitor(&f, feed.clone());

        assert_eq!(
            monitor.check_for_updates(Trigger::Scheduled).await,
            CheckOutcome::NoNewArticles
        );
        assert_eq!(ids(&f.store.load().await), vec!["9"]);

        // Relaxing the filter later does not resurrect it.
        f.config.update(|s| s.filter.exclude_keywords.clear());
        assert_eq!(
            monitor.check_for_updates(Trigger::Scheduled).await,
            CheckOutcome::NoNewArticles
        );
        assert!(f.host.calls().is_empty());
        assert_eq!(feed.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclude_category_vetoes_include_keyword() {
        let f = fixture(10);
        f.config.update(|s| {
            s.filter.include_keywords = vec!["interview".to_string()];
            s.filter.exclude_categories = vec!["Sponsored".to_string()];
        });
        let mut sponsored = record("1", "An Interview with a Studio");
        sponsored.categories = vec!["Sponsored".to_string(), "Interviews".to_string()];
        let monitor = monitor(&f, Arc::new(FakeFeed::new(vec![sponsored])));

        assert_eq!(
            monitor.check_for_updates(Trigger::Scheduled).await,
            CheckOutcome::NoNewArticles
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_clamped_to_per_page() {
        let f = fixture(2);
        let feed = Arc::new(FakeFeed::new(vec![
            record("3", "c"),
            record("2", "b"),
            record("1", "a"),
        ]));
        let monitor = monitor(&f, feed);

        let outcome = monitor.check_for_updates(Trigger::Scheduled).await;

        assert!(matches!(outcome, CheckOutcome::Delivered { articles: 2, .. }));
        assert_eq!(ids(&f.store.load().await), vec!["3", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_records_never_enter_the_store() {
        let f = fixture(10);
        let mut broken = record("5", "no slug");
        broken.slug.clear();
        let monitor = monitor(&f, Arc::new(FakeFeed::new(vec![broken, record("6", "ok")])));

        monitor.check_for_updates(Trigger::Scheduled).await;

        assert_eq!(ids(&f.store.load().await), vec!["6"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_stays_capped() {
        let f = fixture(5);
        let known: Vec<_> = (0..KNOWN_ARTICLES_CAP)
            .map(|i| record(&format!("k{}", i), "k"))
            .collect();
        f.store.save(&known).await.unwrap();
        let fresh: Vec<_> = (0..5).map(|i| record(&format!("n{}", i), "n")).collect();
        let monitor = monitor(&f, Arc::new(FakeFeed::new(fresh)));

        monitor.check_for_updates(Trigger::Scheduled).await;

        let log = f.store.load().await;
        assert_eq!(log.len(), KNOWN_ARTICLES_CAP);
        assert_eq!(log[0].id, "n0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_degrades_single_item() {
        let f = fixture(3);
        let feed = Arc::new(FakeFeed::new(vec![
            record("1", "One"),
            record("2", "Two"),
            record("3", "Three"),
        ]));
        let monitor =
            monitor(&f, feed).with_renderer(Arc::new(FakeRenderer::new().failing_for("Two")));

        let outcome = monitor.check_for_updates(Trigger::Scheduled).await;
        assert!(matches!(outcome, CheckOutcome::Delivered { articles: 3, .. }));

        let card = |id: &str, title: &str| RenderedItem::Card {
            image: format!("https://render/{}.png", title),
            url: format!("https://80.lv/articles/article-{}", id),
        };
        // All three go out together as one folded batch, with only "Two" degraded.
        assert_eq!(
            f.host.article_calls(),
            vec![HostCall::Grouped {
                target: DispatchTarget::Group("100".to_string()),
                items: vec![
                    card("1", "One"),
                    RenderedItem::Plain {
                        title: "Two".to_string(),
                        url: "https://80.lv/articles/article-2".to_string(),
                    },
                    card("3", "Three"),
                ],
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_in_one_page_are_sent_once() {
        let f = fixture(5);
        let feed = Arc::new(FakeFeed::new(vec![record("7", "first"), record("7", "second")]));
        let monitor = monitor(&f, feed);

        let outcome = monitor.check_for_updates(Trigger::Scheduled).await;

        assert!(matches!(outcome, CheckOutcome::Delivered { articles: 1, .. }));
        let sent = f.host.article_calls();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            HostCall::Single { item: RenderedItem::Plain { title, .. }, .. } if title == "first"
        ));
        assert_eq!(ids(&f.store.load().await), vec!["7"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_translation_failure_keeps_original_text() {
        let f = fixture(2);
        let feed = Arc::new(FakeFeed::new(vec![record("1", "Good"), record("2", "Bad")]));
        let monitor = monitor(&f, feed)
            .with_translator(Arc::new(FakeTranslator::new().failing_for("Bad")));

        monitor.check_for_updates(Trigger::Scheduled).await;

        let titles: Vec<_> = f
            .host
            .article_calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Single {
                    item: RenderedItem::Plain { title, .. },
                    ..
                } => Some(title),
                _ => None,
            })
            .collect();
        assert_eq!(titles, vec!["[zh] Good", "Bad"]);

        // The store keeps the untranslated text.
        assert_eq!(f.store.load().await[0].title, "Good");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_check_goes_to_origin_only() {
        let f = fixture(1);
        let requester = Arc::new(FakeHost::new(false));
        let origin = Origin::new(DispatchTarget::User("42".to_string()), requester.clone());
        let monitor = monitor(&f, Arc::new(FakeFeed::new(vec![record("1", "One")])));

        let outcome = monitor.check_for_updates(Trigger::Manual(origin)).await;

        assert!(matches!(outcome, CheckOutcome::Delivered { articles: 1, .. }));
        assert_eq!(requester.article_calls().len(), 1);
        assert!(f.host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_check_while_running_reports_already_running() {
        let f = fixture(1);
        let (feed, entered, release) = FakeFeed::gated(vec![record("1", "One")]);
        let feed = Arc::new(feed);
        let monitor = Arc::new(monitor(&f, feed.clone()));

        let first = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.check_for_updates(Trigger::Scheduled).await }
        });
        entered.notified().await;
        assert_eq!(monitor.state(), CycleState::Checking);

        let requester = Arc::new(FakeHost::new(true));
        let origin = Origin::new(DispatchTarget::Group("7".to_string()), requester);
        assert_eq!(
            monitor.check_for_updates(Trigger::Manual(origin)).await,
            CheckOutcome::AlreadyRunning
        );
        assert_eq!(feed.fetches(), 1);

        release.notify_one();
        assert!(matches!(
            first.await.unwrap(),
            CheckOutcome::Delivered { articles: 1, .. }
        ));
        assert_eq!(monitor.state(), CycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_inside_cycle_releases_guard() {
        let f = fixture(1);
        let feed = Arc::new(FakeFeed::new(vec![record("1", "One")]));
        let monitor = monitor(&f, feed.clone()).with_renderer(Arc::new(FakeRenderer::panicking()));

        let outcome = monitor.check_for_updates(Trigger::Scheduled).await;
        assert_eq!(outcome, CheckOutcome::Failed("renderer exploded".to_string()));
        assert_eq!(monitor.state(), CycleState::Idle);

        // Seen state was persisted before the failure, so the next cycle finds nothing new.
        feed.set_records(vec![record("1", "One")]);
        assert_eq!(
            monitor.check_for_updates(Trigger::Scheduled).await,
            CheckOutcome::NoNewArticles
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_to_origin_is_reported() {
        let f = fixture(1);
        let requester =
            Arc::new(FakeHost::new(true).failing_for(DispatchTarget::Group("7".to_string())));
        let origin = Origin::new(DispatchTarget::Group("7".to_string()), requester);
        let monitor = monitor(&f, Arc::new(FakeFeed::new(vec![record("1", "One")])));

        let outcome = monitor.check_for_updates(Trigger::Manual(origin)).await;

        assert!(matches!(outcome, CheckOutcome::Failed(message) if message.contains("simulated failure")));
        assert_eq!(monitor.state(), CycleState::Idle);
    }
}

//! Page-ready hook: resolve the identifier and decorate outbound links.

use crate::base::config::TrackingConfig;
use crate::base::identifier::TrackingIdentifier;
use crate::decorate::location::tracking_param_from_url;
use crate::decorate::qualify::{LinkQualifier, LinkVerdict};
use crate::decorate::rewrite::append_tracking_param;
use crate::decorate::session::{SessionMemory, SessionStorage};
use crate::decorate::watcher::LinkWatcher;
use crate::dom::{AnchorElement, Document};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use url::Url;

/// Counts from one pass over a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecorationSummary {
    /// Anchors evaluated for the first time in this pass.
    pub evaluated: usize,
    pub decorated: usize,
}

impl DecorationSummary {
    pub fn skipped(&self) -> usize {
        self.evaluated - self.decorated
    }
}

/// What the page-ready hook decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageReady {
    /// No identifier in the URL or session memory; nothing was touched.
    Passive,
    Active {
        identifier: TrackingIdentifier,
        summary: DecorationSummary,
    },
}

impl PageReady {
    pub fn identifier(&self) -> Option<&TrackingIdentifier> {
        match self {
            PageReady::Passive => None,
            PageReady::Active { identifier, .. } => Some(identifier),
        }
    }
}

/// Decorates outbound links with the tracking parameter.
///
/// Independent of the server cookie: the identifier comes only from the page
/// URL or from session memory.
#[derive(Debug)]
pub struct LinkDecorator<S> {
    config: Arc<TrackingConfig>,
    qualifier: LinkQualifier,
    memory: SessionMemory<S>,
}

impl<S: SessionStorage> LinkDecorator<S> {
    pub fn new(config: TrackingConfig, storage: S) -> Self {
        Self::with_shared(Arc::new(config), storage)
    }

    pub fn with_shared(config: Arc<TrackingConfig>, storage: S) -> Self {
        Self {
            qualifier: LinkQualifier::new(config.clone()),
            memory: SessionMemory::new(storage, config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn memory(&self) -> &SessionMemory<S> {
        &self.memory
    }

    pub fn qualifier(&self) -> &LinkQualifier {
        &self.qualifier
    }

    /// Work out the identifier for a page view.
    ///
    /// A value in the page URL always wins and refreshes session memory with
    /// a new expiry. Otherwise the unexpired session value is used.
    pub fn resolve_identifier(&self, page: &Url, now: OffsetDateTime) -> Option<TrackingIdentifier> {
        let from_url = tracking_param_from_url(
            page,
            &self.config.param_name,
            &self.config.encoded_param_name(),
        );

        if let Some(identifier) = from_url {
            self.memory.store(&identifier, now);
            tracing::debug!(identifier = %identifier, "found tracking parameter in page URL");
            return Some(identifier);
        }

        self.memory.load(now)
    }

    pub fn on_page_ready<D: Document + ?Sized>(&self, document: &mut D) -> PageReady {
        self.on_page_ready_at(document, OffsetDateTime::now_utc())
    }

    /// Page-ready hook: resolve the identifier and decorate present anchors.
    ///
    /// Stays passive when there is no identifier. Watching for anchors added
    /// later is set up by [`LinkDecorator::activate`].
    pub fn on_page_ready_at<D: Document + ?Sized>(
        &self,
        document: &mut D,
        now: OffsetDateTime,
    ) -> PageReady {
        let page = document.location().clone();
        let Some(identifier) = self.resolve_identifier(&page, now) else {
            tracing::debug!(page = %page, "no tracking parameter found");
            return PageReady::Passive;
        };

        let summary = self.decorate_document(document, &identifier);
        tracing::info!(
            identifier = %identifier,
            decorated = summary.decorated,
            evaluated = summary.evaluated,
            "link tracking active"
        );
        PageReady::Active {
            identifier,
            summary,
        }
    }

    /// Evaluate every anchor not yet seen and decorate those that qualify.
    /// Safe to repeat: evaluated anchors are skipped.
    pub fn decorate_document<D: Document + ?Sized>(
        &self,
        document: &mut D,
        identifier: &TrackingIdentifier,
    ) -> DecorationSummary {
        let page = document.location().clone();
        let mut summary = DecorationSummary::default();

        document.for_each_anchor(&mut |anchor: &mut dyn AnchorElement| {
            match self.process_anchor(anchor, &page, identifier) {
                LinkVerdict::AlreadyEvaluated | LinkVerdict::MissingHref => {}
                LinkVerdict::Qualifies => {
                    summary.evaluated += 1;
                    summary.decorated += 1;
                }
                _ => summary.evaluated += 1,
            }
        });

        summary
    }

    /// Evaluate a single anchor, rewriting its `href` when it qualifies.
    ///
    /// The anchor is marked evaluated whatever the verdict, so it is
    /// processed at most once per page view.
    pub fn process_anchor(
        &self,
        anchor: &mut dyn AnchorElement,
        page: &Url,
        identifier: &TrackingIdentifier,
    ) -> LinkVerdict {
        if anchor.is_evaluated() {
            return LinkVerdict::AlreadyEvaluated;
        }
        let Some(href) = anchor.href().map(str::to_string) else {
            return LinkVerdict::MissingHref;
        };

        let verdict = self.qualifier.evaluate(&href, page);
        anchor.mark_evaluated();

        if verdict.qualifies() {
            let decorated =
                append_tracking_param(&href, &self.config.param_name, identifier.as_str());
            tracing::debug!(from = %href, to = %decorated, "updated link");
            anchor.set_href(decorated);
        } else {
            tracing::trace!(href = %href, ?verdict, "link left unchanged");
        }

        verdict
    }
}

impl<S> LinkDecorator<S>
where
    S: SessionStorage + Send + Sync + 'static,
{
    /// Run the page-ready hook on a shared document and, if it goes active,
    /// start a [`LinkWatcher`] for anchors added later.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate<D>(self: &Arc<Self>, document: Arc<Mutex<D>>) -> (PageReady, Option<LinkWatcher>)
    where
        D: Document + Send + 'static,
    {
        self.activate_at(document, OffsetDateTime::now_utc())
    }

    pub fn activate_at<D>(
        self: &Arc<Self>,
        document: Arc<Mutex<D>>,
        now: OffsetDateTime,
    ) -> (PageReady, Option<LinkWatcher>)
    where
        D: Document + Send + 'static,
    {
        let ready = {
            let mut guard = document.lock().unwrap_or_else(PoisonError::into_inner);
            self.on_page_ready_at(&mut *guard, now)
        };

        let watcher = ready
            .identifier()
            .cloned()
            .map(|identifier| LinkWatcher::spawn(document, Arc::clone(self), identifier));
        (ready, watcher)
    }
}

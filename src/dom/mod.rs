//! A minimal page model for the link decorator.
//!
//! The decorator only needs three things from a document: its location, the
//! anchors that carry an `href`, and a per-anchor "already evaluated" flag.
//! [`Document`] and [`AnchorElement`] describe exactly that, so any DOM
//! binding can be adapted. [`Page`] and [`Anchor`] are the in-memory
//! implementation used by the CLI and the tests.

use crate::base::error::GlueError;
use url::Url;

/// An element whose `href` may be rewritten.
pub trait AnchorElement {
    fn href(&self) -> Option<&str>;

    fn set_href(&mut self, href: String);

    /// Whether the decorator has already looked at this element.
    fn is_evaluated(&self) -> bool;

    /// Record that the element has been looked at. Never undone.
    fn mark_evaluated(&mut self);
}

/// A document holding anchors.
pub trait Document {
    fn location(&self) -> &Url;

    /// Visit every anchor that has an `href`, in document order.
    fn for_each_anchor(&mut self, f: &mut dyn FnMut(&mut dyn AnchorElement));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    href: Option<String>,
    evaluated: bool,
}

impl Anchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            evaluated: false,
        }
    }

    /// An `<a>` without an `href`, e.g. a named target.
    pub fn without_href() -> Self {
        Self {
            href: None,
            evaluated: false,
        }
    }
}

impl AnchorElement for Anchor {
    fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    fn set_href(&mut self, href: String) {
        self.href = Some(href);
    }

    fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    fn mark_evaluated(&mut self) {
        self.evaluated = true;
    }
}

/// Kind of change reported to the link watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Nodes were added or removed.
    ChildList,
    Attributes,
    CharacterData,
}

/// A single observed change to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Anchors with an `href` inside the added nodes.
    pub added_anchors: usize,
}

impl MutationRecord {
    pub fn child_list(added_anchors: usize) -> Self {
        Self {
            kind: MutationKind::ChildList,
            added_anchors,
        }
    }

    pub fn attributes() -> Self {
        Self {
            kind: MutationKind::Attributes,
            added_anchors: 0,
        }
    }

    pub fn character_data() -> Self {
        Self {
            kind: MutationKind::CharacterData,
            added_anchors: 0,
        }
    }

    /// Only structural additions that bring in anchors warrant a rescan.
    pub fn adds_anchors(&self) -> bool {
        self.kind == MutationKind::ChildList && self.added_anchors > 0
    }
}

/// An in-memory page: a location plus its anchors.
#[derive(Debug, Clone)]
pub struct Page {
    location: Url,
    anchors: Vec<Anchor>,
}

impl Page {
    pub fn new(location: &str) -> Result<Self, GlueError> {
        let location = Url::parse(location).map_err(|_| GlueError::invalid_url(location))?;
        Ok(Self {
            location,
            anchors: Vec::new(),
        })
    }

    pub fn with_links<I, S>(mut self, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.anchors.extend(hrefs.into_iter().map(Anchor::new));
        self
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Current `href` of every anchor that has one.
    pub fn hrefs(&self) -> Vec<&str> {
        self.anchors.iter().filter_map(|a| a.href()).collect()
    }

    /// Insert anchors as new content and describe the change for the watcher.
    pub fn append_anchors(&mut self, anchors: impl IntoIterator<Item = Anchor>) -> MutationRecord {
        let before = self.anchors.len();
        self.anchors.extend(anchors);
        let added = self.anchors[before..]
            .iter()
            .filter(|a| a.href().is_some())
            .count();
        MutationRecord::child_list(added)
    }

    pub fn append_links<I, S>(&mut self, hrefs: I) -> MutationRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_anchors(hrefs.into_iter().map(Anchor::new))
    }
}

impl Document for Page {
    fn location(&self) -> &Url {
        &self.location
    }

    fn for_each_anchor(&mut self, f: &mut dyn FnMut(&mut dyn AnchorElement)) {
        for anchor in self.anchors.iter_mut().filter(|a| a.href.is_some()) {
            f(anchor);
        }
    }
}

//! Browser side: keeping outbound links tagged with the identifier.
//!
//! On page ready the [`LinkDecorator`](decorator::LinkDecorator) reads the
//! identifier from the page URL (refreshing session memory) or falls back to
//! session memory, then appends `switch_cls[id]=<value>` to every external
//! link that is not excluded. A [`LinkWatcher`](watcher::LinkWatcher) repeats
//! the pass when content adds new anchors.
//!
//! This side never reads the server cookie, and the server never reads
//! session memory. The two stores are populated independently and may
//! disagree.
//!
//! ```rust
//! use leadglue::base::config::TrackingConfig;
//! use leadglue::decorate::decorator::LinkDecorator;
//! use leadglue::decorate::session::MemorySessionStorage;
//! use leadglue::dom::Page;
//!
//! let decorator = LinkDecorator::new(TrackingConfig::default(), MemorySessionStorage::new());
//! let mut page = Page::new("https://homes.example/?switch_cls[id]=ABC123")?
//!     .with_links(["https://partner.example/page", "mailto:info@example.com"]);
//!
//! decorator.on_page_ready(&mut page);
//! assert_eq!(
//!     page.hrefs(),
//!     vec![
//!         "https://partner.example/page?switch_cls[id]=ABC123",
//!         "mailto:info@example.com",
//!     ]
//! );
//! # Ok::<(), leadglue::base::error::GlueError>(())
//! ```

pub mod decorator;
pub mod location;
pub mod qualify;
pub mod rewrite;
pub mod session;
pub mod watcher;

pub use decorator::{DecorationSummary, LinkDecorator, PageReady};
pub use qualify::{LinkQualifier, LinkVerdict};
pub use session::{MemorySessionStorage, SessionMemory, SessionStorage};
pub use watcher::LinkWatcher;

//! Core application logic for Artifact Fetcher
//!
//! This module contains the rule key codec, the cache client boundary and its
//! bundled backends, the event bus, the fetch orchestrator and the live
//! progress listener.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use artifact_fetcher::app::{
//!     CacheBackendFactory, CacheConfig, EventBus, FetchConfig, FetchOrchestrator,
//!     LiveProgressListener,
//! };
//!
//! # async fn example() {
//! let bus = Arc::new(EventBus::new());
//! let listener = Arc::new(LiveProgressListener::default());
//! bus.register(listener.clone());
//!
//! let factory = Arc::new(CacheBackendFactory::new(CacheConfig::dir("/var/cache/artifacts")));
//! let orchestrator = FetchOrchestrator::new(FetchConfig::default(), factory, bus);
//!
//! let keys = vec!["b64009ae3762a42a1651c139ec452f0d18f48e21".to_string()];
//! orchestrator.run(&keys, &mut std::io::stderr()).await;
//!
//! for line in listener.render(0) {
//!     println!("{}", line);
//! }
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod events;
pub mod lazy_path;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod rule_key;

// Re-export main public API
pub use cache::{
    ArtifactCache, ArtifactCacheFactory, CacheBackend, CacheBackendFactory, CacheConfig,
    CacheLease, DirArtifactCache, HttpArtifactCache, HttpClientConfig,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventBus, FetchEventListener};
pub use lazy_path::{LazyPath, OutputDirectory, OutputLocation};
pub use models::{
    CacheMode, CacheResult, CacheResultKind, ExitStatus, FetchEvent, FetchEventKind, FetchOutcome,
};
pub use orchestrator::{FetchConfig, FetchOrchestrator, FetchSummary, ShutdownHandle, SignalHandler};
pub use progress::{
    DisplayLocale, Emphasis, ListenerPhase, LiveProgressListener, ProgressConfig,
    ProgressCounters, RenderedLine, SummaryVerbosity,
};
pub use rule_key::RuleKey;

//! caselens — case intelligence over multi-document legal case files.
//!
//! A case is a set of ingested documents (court orders, CPS records,
//! filings) plus everything the engine derives from them: detected
//! violations, a chronological timeline with statutory-gap findings, a
//! registry of resolved actors with derived risk, and cross-document
//! contradictions. [`aggregator::CaseStore`] is the front door; it runs
//! every analysis stage on ingestion and publishes one immutable snapshot
//! per case.
//!
//! ```no_run
//! use caselens::aggregator::{CaseStore, IngestRequest, ViolationFilter};
//! use caselens::config::EngineConfig;
//!
//! # fn main() -> Result<(), caselens::error::EngineError> {
//! let store = CaseStore::new(EngineConfig::default(), None)?;
//! store.create_case("smith-v-dhr", "Smith v. DHR")?;
//! store.ingest(IngestRequest {
//!     case_id: "smith-v-dhr".into(),
//!     text: "The child was removed without court order on 01/05/2024.".into(),
//!     page_offsets: Vec::new(),
//! })?;
//! let violations = store.violations("smith-v-dhr", &ViolationFilter::default())?;
//! # Ok(())
//! # }
//! ```

pub mod actors;
pub mod aggregator;
pub mod config;
pub mod contradiction;
pub mod detection;
pub mod error;
pub mod models;
pub mod normalize;
pub mod reasoning;
pub mod search;
pub mod snapshot;
pub mod timeline;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub mod content_fetcher;
pub mod droid;
pub mod exporter;
pub mod financial_reconciler;
pub mod openai_client;
pub mod page_discoverer;
pub mod persistence_gate;
pub mod pipeline;
pub mod rate_limiter;
pub mod structured_extractor;
pub mod website_resolver;

pub use content_fetcher::*;
pub use droid::*;
pub use financial_reconciler::*;
pub use openai_client::*;
pub use page_discoverer::*;
pub use persistence_gate::*;
pub use pipeline::*;
pub use rate_limiter::*;
pub use structured_extractor::*;
pub use website_resolver::*;

//! Search tools the research and marketing agents call mid-generation.
//!
//! - **web_search**: Bing Web Search v7 grounding for the researcher
//! - **product_search**: query embedding plus cosine ranking over an
//!   in-memory product catalog for the marketer

pub mod embedding;
pub mod product_search;
pub mod store;
pub mod types;
pub mod web_search;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use product_search::{PRODUCT_SEARCH_TOOL, ProductSearchTool};
pub use store::{ProductIndex, cosine_similarity};
pub use types::{ProductRecord, ProductSearchConfig, SearchHit, WebSearchConfig};
pub use web_search::{WEB_SEARCH_TOOL, WebSearchTool};

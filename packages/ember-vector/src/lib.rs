pub mod namespace;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use namespace::{Namespaces, parse_distance};
pub use store::{
	BestMatch, CrossNamespaceSearch, CrossSummary, NamespaceHits, NamespaceStats,
	NamespaceStatsEntry, NewPoint, ScoredHit, SearchOptions, VectorStore,
};

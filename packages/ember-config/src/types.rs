use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub provider: EmbeddingProviderConfig,
	#[serde(default)]
	pub queue: Queue,
	#[serde(default)]
	pub namespaces: NamespacesConfig,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub vector_dim: u32,
	#[serde(default = "default_distance")]
	pub distance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_models_path")]
	pub models_path: String,
	#[serde(default = "default_embeddings_path")]
	pub embeddings_path: String,
	pub timeout_ms: u64,
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_batch_pause_ms")]
	pub batch_pause_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Queue {
	pub default_max_retries: u32,
	pub watch_timeout_seconds: u64,
	pub retry_pause_seconds: u64,
	pub archive_retention_days: i64,
}
impl Default for Queue {
	fn default() -> Self {
		Self {
			default_max_retries: 3,
			watch_timeout_seconds: 5,
			retry_pause_seconds: 5,
			archive_retention_days: 30,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NamespacesConfig {
	pub layers: Vec<String>,
	pub categories: Vec<String>,
}
impl Default for NamespacesConfig {
	fn default() -> Self {
		Self {
			layers: vec!["frontend".to_string(), "backend".to_string()],
			categories: vec![
				"knowledge".to_string(),
				"documentation".to_string(),
				"completion_summaries".to_string(),
				"repositories".to_string(),
				"indexes".to_string(),
				"tasks".to_string(),
				"confidence".to_string(),
				"problem_solving".to_string(),
			],
		}
	}
}

fn default_distance() -> String {
	"cosine".to_string()
}

fn default_models_path() -> String {
	"/v1/models".to_string()
}

fn default_embeddings_path() -> String {
	"/v1/embeddings".to_string()
}

fn default_batch_size() -> u32 {
	10
}

fn default_batch_pause_ms() -> u64 {
	200
}

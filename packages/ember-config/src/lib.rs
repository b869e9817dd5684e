mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, NamespacesConfig, Postgres, Qdrant, Queue, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.storage.qdrant.distance.as_str(), "cosine" | "dot" | "euclid") {
		return Err(Error::Validation {
			message: "storage.qdrant.distance must be one of cosine, dot, or euclid.".to_string(),
		});
	}
	if cfg.provider.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "provider.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.provider.api_key.trim().is_empty() {
		return Err(Error::Validation { message: "provider.api_key must be non-empty.".to_string() });
	}
	if cfg.provider.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "provider.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.provider.batch_size == 0 {
		return Err(Error::Validation {
			message: "provider.batch_size must be greater than zero.".to_string(),
		});
	}

	for (label, path) in [
		("provider.models_path", &cfg.provider.models_path),
		("provider.embeddings_path", &cfg.provider.embeddings_path),
	] {
		if !path.starts_with('/') {
			return Err(Error::Validation {
				message: format!("{label} must start with a slash."),
			});
		}
	}

	if cfg.queue.watch_timeout_seconds == 0 {
		return Err(Error::Validation {
			message: "queue.watch_timeout_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.archive_retention_days <= 0 {
		return Err(Error::Validation {
			message: "queue.archive_retention_days must be greater than zero.".to_string(),
		});
	}

	for (label, names) in
		[("namespaces.layers", &cfg.namespaces.layers), ("namespaces.categories", &cfg.namespaces.categories)]
	{
		if names.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}

		for name in names {
			if name.is_empty()
				|| !name.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
			{
				return Err(Error::Validation {
					message: format!(
						"{label} entries must be lowercase alphanumeric or underscore, got {name:?}."
					),
				});
			}
		}

		let mut seen = names.clone();

		seen.sort();
		seen.dedup();

		if seen.len() != names.len() {
			return Err(Error::Validation {
				message: format!("{label} entries must be distinct."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.qdrant.distance = cfg.storage.qdrant.distance.to_ascii_lowercase();

	while cfg.provider.api_base.ends_with('/') {
		cfg.provider.api_base.pop();
	}
}

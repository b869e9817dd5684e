use std::{
	sync::{Arc, RwLock},
	time::Duration,
};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{task::JoinSet, time as tokio_time};

use crate::{
	Error, Result, auth_headers,
	catalog::{Selection, Tier, parse_models_response},
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct Embedding {
	pub vector: Vec<f32>,
	pub model: String,
	pub dimensions: usize,
	pub usage: Usage,
}

/// Discovers embedding-capable models of the configured provider, ranks them
/// into tiers, and embeds with a bounded linear fallback across those tiers.
#[derive(Clone)]
pub struct ModelSelector {
	cfg: Arc<ember_config::EmbeddingProviderConfig>,
	selection: Arc<RwLock<Selection>>,
}
impl ModelSelector {
	pub fn new(cfg: ember_config::EmbeddingProviderConfig) -> Self {
		Self { cfg: Arc::new(cfg), selection: Arc::new(RwLock::new(Selection::default())) }
	}

	/// Fetches the provider's model list and recomputes the tier selection.
	pub async fn refresh_catalog(&self) -> Result<Selection> {
		let client = self.client()?;
		let url = format!("{}{}", self.cfg.api_base, self.cfg.models_path);
		let res = client
			.get(url)
			.headers(auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.send()
			.await
			.map_err(Error::Connection)?;
		let json: Value = res.error_for_status()?.json().await?;
		let ids = parse_models_response(json)?;
		let selection = Selection::from_ids(&ids);

		*self.selection.write().unwrap_or_else(|err| err.into_inner()) = selection.clone();

		Ok(selection)
	}

	pub fn selection(&self) -> Selection {
		self.selection.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Embeds one text, starting at the requested tier and falling through the
	/// remaining tiers on provider errors. Raises once, after the last tier.
	pub async fn embed(&self, text: &str, tier: Tier) -> Result<Embedding> {
		let selection = self.selection();
		let mut last_error: Option<Error> = None;

		for tier in tier.cascade_order() {
			let Some(model) = selection.model_for(*tier) else {
				continue;
			};

			match self.request_embedding(&model.id, text).await {
				Ok(embedding) => return Ok(embedding),
				Err(err) => {
					last_error = Some(err);
				},
			}
		}

		Err(match last_error {
			Some(err) => Error::ModelsExhausted { last_error: err.to_string() },
			None => Error::NoCatalog,
		})
	}

	/// Embeds texts in batches of `provider.batch_size`: concurrent within a
	/// batch, a short pause between batches, and the whole call fails if any
	/// item exhausts its cascade.
	pub async fn embed_batch(&self, texts: &[String], tier: Tier) -> Result<Vec<Embedding>> {
		let batch_size = (self.cfg.batch_size as usize).max(1);
		let pause = Duration::from_millis(self.cfg.batch_pause_ms);
		let mut embeddings: Vec<Option<Embedding>> = Vec::new();

		embeddings.resize_with(texts.len(), || None);

		for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
			if batch_index > 0 && !pause.is_zero() {
				tokio_time::sleep(pause).await;
			}

			let offset = batch_index * batch_size;
			let mut set = JoinSet::new();

			for (item_index, text) in batch.iter().cloned().enumerate() {
				let selector = self.clone();

				set.spawn(async move {
					let embedding = selector.embed(&text, tier).await;

					(offset + item_index, embedding)
				});
			}

			while let Some(joined) = set.join_next().await {
				let (index, embedding) = joined.map_err(|err| Error::InvalidResponse {
					message: format!("Embedding task failed: {err}."),
				})?;

				embeddings[index] = Some(embedding?);
			}
		}

		Ok(embeddings.into_iter().flatten().collect())
	}

	async fn request_embedding(&self, model: &str, text: &str) -> Result<Embedding> {
		let client = self.client()?;
		let url = format!("{}{}", self.cfg.api_base, self.cfg.embeddings_path);
		let body = serde_json::json!({
			"model": model,
			"input": [text],
		});
		let res = client
			.post(url)
			.headers(auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		let (vector, usage) = parse_embedding_response(json)?;

		Ok(Embedding { dimensions: vector.len(), model: model.to_string(), vector, usage })
	}

	fn client(&self) -> Result<Client> {
		Ok(Client::builder().timeout(Duration::from_millis(self.cfg.timeout_ms)).build()?)
	}
}

fn parse_embedding_response(json: Value) -> Result<(Vec<f32>, Usage)> {
	let data = json.get("data").and_then(|value| value.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let embedding = data
		.first()
		.and_then(|item| item.get("embedding"))
		.and_then(|value| value.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding item is missing the embedding array.".to_string(),
		})?;
	let mut vector = Vec::with_capacity(embedding.len());

	for value in embedding {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding values must be numeric.".to_string(),
		})?;

		vector.push(number as f32);
	}

	let usage = json
		.get("usage")
		.map(|value| Usage {
			prompt_tokens: value.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
			total_tokens: value.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
		})
		.unwrap_or_default();

	Ok((vector, usage))
}

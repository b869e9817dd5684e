use mockito::{Matcher, Server};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, json};

use ember_providers::{Error, ModelSelector, Tier};

fn provider_cfg(api_base: String) -> ember_config::EmbeddingProviderConfig {
	ember_config::EmbeddingProviderConfig {
		api_base,
		api_key: "test-key".to_string(),
		models_path: "/v1/models".to_string(),
		embeddings_path: "/v1/embeddings".to_string(),
		timeout_ms: 2_000,
		batch_size: 2,
		batch_pause_ms: 0,
		default_headers: Map::new(),
	}
}

const MODELS_BODY: &str = r#"{
	"data": [
		{ "id": "bge-large-en-v1.5" },
		{ "id": "e5-base-v2" },
		{ "id": "nomic-embed-text" },
		{ "id": "llama-3.1-8b-instruct" }
	]
}"#;

#[test]
fn builds_bearer_auth_header() {
	let headers =
		ember_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[tokio::test]
async fn refresh_catalog_ranks_models_into_tiers() {
	let mut server = Server::new_async().await;
	let models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));
	let selection = selector.refresh_catalog().await.expect("Catalog refresh failed.");

	models.assert_async().await;

	assert_eq!(selection.primary.expect("Primary must be set.").id, "bge-large-en-v1.5");
	assert_eq!(selection.secondary.expect("Secondary must be set.").id, "e5-base-v2");
	assert_eq!(selection.tertiary.expect("Tertiary must be set.").id, "nomic-embed-text");
}

#[tokio::test]
async fn refresh_catalog_fails_with_connection_error_when_unreachable() {
	let selector = ModelSelector::new(provider_cfg("http://127.0.0.1:1".to_string()));
	let err = selector.refresh_catalog().await.expect_err("Unreachable provider must fail.");

	assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn embed_without_a_catalog_is_rejected() {
	let selector = ModelSelector::new(provider_cfg("http://127.0.0.1:1".to_string()));
	let err = selector.embed("hello", Tier::Primary).await.expect_err("No catalog, no embed.");

	assert!(matches!(err, Error::NoCatalog));
}

#[tokio::test]
async fn cascade_falls_through_to_the_secondary_tier() {
	let mut server = Server::new_async().await;
	let _models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let primary_down = server
		.mock("POST", "/v1/embeddings")
		.match_body(Matcher::PartialJson(json!({ "model": "bge-large-en-v1.5" })))
		.with_status(500)
		.expect(1)
		.create_async()
		.await;
	let secondary_up = server
		.mock("POST", "/v1/embeddings")
		.match_body(Matcher::PartialJson(json!({ "model": "e5-base-v2" })))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(
			r#"{ "data": [{ "embedding": [0.1, 0.2, 0.3] }], "usage": { "prompt_tokens": 2, "total_tokens": 2 } }"#,
		)
		.expect(1)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));

	selector.refresh_catalog().await.expect("Catalog refresh failed.");

	let embedding =
		selector.embed("hello", Tier::Primary).await.expect("Cascade must recover.");

	primary_down.assert_async().await;
	secondary_up.assert_async().await;

	assert_eq!(embedding.model, "e5-base-v2");
	assert_eq!(embedding.dimensions, 3);
	assert_eq!(embedding.usage.total_tokens, 2);
}

#[tokio::test]
async fn exhausted_cascade_raises_exactly_once() {
	let mut server = Server::new_async().await;
	let _models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let all_down = server
		.mock("POST", "/v1/embeddings")
		.with_status(503)
		.expect(3)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));

	selector.refresh_catalog().await.expect("Catalog refresh failed.");

	let err = selector
		.embed("hello", Tier::Primary)
		.await
		.expect_err("Exhausted cascade must fail.");

	// One attempt per tier, then a single terminal error.
	all_down.assert_async().await;

	assert!(matches!(err, Error::ModelsExhausted { .. }));
}

#[tokio::test]
async fn lower_starting_tiers_do_not_climb_back_up() {
	let mut server = Server::new_async().await;
	let _models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let tertiary_only = server
		.mock("POST", "/v1/embeddings")
		.match_body(Matcher::PartialJson(json!({ "model": "nomic-embed-text" })))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{ "data": [{ "embedding": [1.0] }] }"#)
		.expect(1)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));

	selector.refresh_catalog().await.expect("Catalog refresh failed.");

	let embedding =
		selector.embed("hello", Tier::Tertiary).await.expect("Tertiary embed failed.");

	tertiary_only.assert_async().await;

	assert_eq!(embedding.model, "nomic-embed-text");
}

#[tokio::test]
async fn embed_batch_embeds_every_text() {
	let mut server = Server::new_async().await;
	let _models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let embeddings = server
		.mock("POST", "/v1/embeddings")
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(r#"{ "data": [{ "embedding": [0.5, 0.5] }] }"#)
		.expect(5)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));

	selector.refresh_catalog().await.expect("Catalog refresh failed.");

	let texts: Vec<String> = (0..5).map(|index| format!("text {index}")).collect();
	let results = selector.embed_batch(&texts, Tier::Primary).await.expect("Batch failed.");

	embeddings.assert_async().await;

	assert_eq!(results.len(), 5);
	assert!(results.iter().all(|embedding| embedding.dimensions == 2));
}

#[tokio::test]
async fn embed_batch_fails_when_any_item_exhausts_its_cascade() {
	let mut server = Server::new_async().await;
	let _models = server
		.mock("GET", "/v1/models")
		.with_status(200)
		.with_body(MODELS_BODY)
		.create_async()
		.await;
	let _all_down = server
		.mock("POST", "/v1/embeddings")
		.with_status(503)
		.expect_at_least(3)
		.create_async()
		.await;
	let selector = ModelSelector::new(provider_cfg(server.url()));

	selector.refresh_catalog().await.expect("Catalog refresh failed.");

	let texts = vec!["a".to_string(), "b".to_string()];
	let err = selector
		.embed_batch(&texts, Tier::Primary)
		.await
		.expect_err("Batch with failing items must fail.");

	assert!(matches!(err, Error::ModelsExhausted { .. }));
}

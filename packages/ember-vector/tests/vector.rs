use serde_json::json;
use uuid::Uuid;

use ember_vector::{Namespaces, NewPoint, SearchOptions, VectorStore};

const IGNORE_REASON: &str = "Requires external Qdrant. Set EMBER_QDRANT_URL to run.";
const DIM: u32 = 4;

struct TestStore {
	store: VectorStore,
	collections: Vec<String>,
}

/// A unique namespace table per test run so concurrent runs cannot collide on
/// collection names.
fn unique_namespaces(categories: &[&str]) -> (ember_config::NamespacesConfig, String) {
	let suffix = Uuid::new_v4().simple().to_string();
	let cfg = ember_config::NamespacesConfig {
		layers: vec!["frontend".to_string(), "backend".to_string()],
		categories: categories.iter().map(|category| format!("{category}_{suffix}")).collect(),
	};

	(cfg, suffix)
}

async fn test_store(categories: &[&str]) -> Option<(TestStore, String)> {
	let url = ember_testkit::env_qdrant_url()?;
	let (namespaces_cfg, suffix) = unique_namespaces(categories);
	let qdrant_cfg = ember_config::Qdrant {
		url,
		vector_dim: DIM,
		distance: "cosine".to_string(),
	};
	let namespaces =
		Namespaces::new(&namespaces_cfg, DIM, "cosine").expect("Namespace table must build.");
	let store =
		VectorStore::connect(&qdrant_cfg, namespaces).await.expect("Failed to connect to Qdrant.");

	store.ensure_collections().await.expect("Failed to ensure collections.");

	let collections =
		store.namespaces().iter().map(|(_, _, collection)| collection).collect();

	Some((TestStore { store, collections }, suffix))
}

async fn cleanup(test_store: TestStore) {
	ember_testkit::cleanup_collections(&test_store.collections)
		.await
		.expect("Failed to cleanup collections.");
}

fn point(id: Option<&str>, vector: Vec<f32>, text: &str) -> NewPoint {
	NewPoint {
		id: id.map(str::to_string),
		vector,
		text: text.to_string(),
		metadata: json!({}),
		model: "test-embed".to_string(),
	}
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set EMBER_QDRANT_URL to run."]
async fn ensure_collection_is_idempotent() {
	let Some((test_store, suffix)) = test_store(&["knowledge"]).await else {
		eprintln!("Skipping ensure_collection_is_idempotent; {IGNORE_REASON}");

		return;
	};
	let store = &test_store.store;
	let category = format!("knowledge_{suffix}");

	// A second sweep over already-existing collections must be a no-op.
	store.ensure_collections().await.expect("Repeated ensure must succeed.");

	let ids = store
		.upsert_points(
			&category,
			"frontend",
			vec![point(None, vec![1.0, 0.0, 0.0, 0.0], "survivor")],
		)
		.await
		.expect("Upsert failed.");

	store.ensure_collections().await.expect("Ensure after writes must succeed.");

	let stats = store.stats(&category, "frontend").await.expect("Stats failed.");

	assert_eq!(stats.points_count, ids.len() as u64, "Existing data must be left untouched.");

	cleanup(test_store).await;
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set EMBER_QDRANT_URL to run."]
async fn upsert_then_search_round_trips() {
	let Some((test_store, suffix)) = test_store(&["knowledge"]).await else {
		eprintln!("Skipping upsert_then_search_round_trips; {IGNORE_REASON}");

		return;
	};
	let store = &test_store.store;
	let category = format!("knowledge_{suffix}");
	let point_id = Uuid::new_v4().to_string();
	let vector = vec![0.5, 0.5, 0.0, 0.0];
	let ids = store
		.upsert_points(
			&category,
			"frontend",
			vec![point(Some(&point_id), vector.clone(), "hello")],
		)
		.await
		.expect("Upsert failed.");

	assert_eq!(ids, vec![point_id.clone()]);

	let hits = store
		.similarity_search(&category, "frontend", &vector, &SearchOptions::default())
		.await
		.expect("Search failed.");
	let top = hits.first().expect("Query vector must match its own point.");

	assert_eq!(top.id, point_id);
	assert!(top.score >= 0.99, "Identical vector must score near 1.0, got {}.", top.score);

	for key in ["text", "category", "layer", "model", "dimensions", "timestamp"] {
		assert!(top.payload.contains_key(key), "Stored payload must carry {key}.");
	}

	cleanup(test_store).await;
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set EMBER_QDRANT_URL to run."]
async fn dimension_mismatch_is_rejected_locally() {
	let Some((test_store, suffix)) = test_store(&["knowledge"]).await else {
		eprintln!("Skipping dimension_mismatch_is_rejected_locally; {IGNORE_REASON}");

		return;
	};
	let store = &test_store.store;
	let category = format!("knowledge_{suffix}");
	let result = store
		.upsert_points(&category, "frontend", vec![point(None, vec![1.0, 0.0], "short")])
		.await;

	assert!(matches!(result, Err(ember_vector::Error::DimensionMismatch { expected: 4, got: 2 })));

	cleanup(test_store).await;
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set EMBER_QDRANT_URL to run."]
async fn cross_namespace_search_finds_the_global_best() {
	let Some((test_store, suffix)) = test_store(&["knowledge", "documentation"]).await else {
		eprintln!("Skipping cross_namespace_search_finds_the_global_best; {IGNORE_REASON}");

		return;
	};
	let store = &test_store.store;
	let knowledge = format!("knowledge_{suffix}");
	let documentation = format!("documentation_{suffix}");
	let query = vec![1.0, 0.0, 0.0, 0.0];
	let best_id = Uuid::new_v4().to_string();

	store
		.upsert_points(
			&knowledge,
			"frontend",
			vec![point(None, vec![0.8, 0.6, 0.0, 0.0], "near")],
		)
		.await
		.expect("Upsert failed.");
	store
		.upsert_points(
			&knowledge,
			"backend",
			vec![point(None, vec![0.6, 0.8, 0.0, 0.0], "farther")],
		)
		.await
		.expect("Upsert failed.");
	store
		.upsert_points(
			&documentation,
			"backend",
			vec![point(Some(&best_id), vec![1.0, 0.0, 0.0, 0.0], "exact")],
		)
		.await
		.expect("Upsert failed.");

	let searched = store
		.cross_namespace_search(
			&query,
			Some(&[knowledge.clone(), documentation.clone()]),
			&SearchOptions { score_threshold: 0.0, ..SearchOptions::default() },
		)
		.await
		.expect("Cross search failed.");

	assert_eq!(searched.results.len(), 4, "Two categories across two layers.");

	let best = searched.summary.best_match.expect("Best match must exist.");

	assert_eq!(best.id, best_id);
	assert_eq!(best.category, documentation);
	assert_eq!(best.layer, "backend");
	assert_eq!(searched.summary.total_matches, 3);

	cleanup(test_store).await;
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set EMBER_QDRANT_URL to run."]
async fn delete_update_and_stats_cover_the_point_lifecycle() {
	let Some((test_store, suffix)) = test_store(&["tasks"]).await else {
		eprintln!("Skipping delete_update_and_stats_cover_the_point_lifecycle; {IGNORE_REASON}");

		return;
	};
	let store = &test_store.store;
	let category = format!("tasks_{suffix}");
	let keep = Uuid::new_v4().to_string();
	let stale = Uuid::new_v4().to_string();

	store
		.upsert_points(
			&category,
			"backend",
			vec![
				point(Some(&keep), vec![1.0, 0.0, 0.0, 0.0], "keep"),
				point(Some(&stale), vec![0.0, 1.0, 0.0, 0.0], "stale"),
			],
		)
		.await
		.expect("Upsert failed.");

	let mut patch = serde_json::Map::new();

	patch.insert("reviewed".to_string(), json!(true));
	store
		.update_payload(&category, "backend", &keep, patch)
		.await
		.expect("Payload update failed.");
	store.delete_points(&category, "backend", &[stale]).await.expect("Delete failed.");

	let stats = store.stats(&category, "backend").await.expect("Stats failed.");

	assert_eq!(stats.points_count, 1);

	let entries = store.all_stats().await;

	// tasks × {frontend, backend}.
	assert_eq!(entries.len(), 2);
	assert!(entries.iter().all(|entry| entry.error.is_none()));
	assert_eq!(
		entries.iter().filter_map(|entry| entry.points_count).sum::<u64>(),
		1,
		"Only the kept point remains across the table."
	);

	cleanup(test_store).await;
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to reach the model provider: {0}")]
	Connection(#[source] reqwest::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("No embedding-capable model is selected; refresh the catalog first.")]
	NoCatalog,
	#[error("Every embedding tier failed; last error: {last_error}")]
	ModelsExhausted { last_error: String },
}

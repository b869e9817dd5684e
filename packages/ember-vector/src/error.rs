pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to connect to the vector backend: {0}")]
	Connection(#[source] Box<qdrant_client::QdrantError>),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
	#[error("Unknown namespace: {category}/{layer}.")]
	UnknownNamespace { category: String, layer: String },
	#[error("Vector dimension mismatch: expected {expected}, got {got}.")]
	DimensionMismatch { expected: usize, got: usize },
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	InvalidRequest { message: String },
	#[error(transparent)]
	Queue(#[from] ember_queue::Error),
	#[error(transparent)]
	Vector(#[from] ember_vector::Error),
	#[error(transparent)]
	Provider(#[from] ember_providers::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}

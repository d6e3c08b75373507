#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	/// A stored pgvector literal that does not parse.
	#[error("Malformed vector: {0}")]
	MalformedVector(String),
	#[error("Unknown outbox job kind: {0}.")]
	UnknownJobKind(String),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}

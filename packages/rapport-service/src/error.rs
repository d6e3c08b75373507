use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider rate limited.")]
	RateLimited { retry_after: Option<Duration> },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<rapport_storage::Error> for Error {
	fn from(err: rapport_storage::Error) -> Self {
		match err {
			rapport_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
impl From<rapport_providers::Error> for Error {
	fn from(err: rapport_providers::Error) -> Self {
		match err {
			rapport_providers::Error::RateLimited { retry_after } =>
				Self::RateLimited { retry_after },
			other => Self::Provider { message: other.to_string() },
		}
	}
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant { message: err.to_string() }
	}
}

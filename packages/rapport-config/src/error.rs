use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read Rapport config at {path:?}.")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Rapport config at {path:?} is not valid TOML.")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	/// A field is present but out of range or inconsistent with another field.
	#[error("Invalid config: {message}")]
	Validation { message: String },
}

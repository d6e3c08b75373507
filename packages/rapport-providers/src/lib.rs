pub mod embedding;
pub mod error;
pub mod generation;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName, RETRY_AFTER},
};
use serde_json::{Map, Value};
use time::{OffsetDateTime, PrimitiveDateTime, macros::format_description};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Maps 429 to [`Error::RateLimited`] and every other non-success status to a reqwest error.
pub(crate) fn check_status(res: Response) -> Result<Response> {
	if res.status() == StatusCode::TOO_MANY_REQUESTS {
		let retry_after = res
			.headers()
			.get(RETRY_AFTER)
			.and_then(|value| value.to_str().ok())
			.and_then(|raw| parse_retry_after(raw, OffsetDateTime::now_utc()));

		tracing::warn!(?retry_after, "Provider returned 429.");

		return Err(Error::RateLimited { retry_after });
	}

	Ok(res.error_for_status()?)
}

/// Reads a `Retry-After` value given either as delta seconds or as an IMF-fixdate.
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}
	if let Ok(seconds) = raw.parse::<u64>() {
		return Some(Duration::from_secs(seconds));
	}

	let format = format_description!(
		"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
	);
	let at = PrimitiveDateTime::parse(raw, format).ok()?.assume_utc();
	let wait = at - now;

	Some(Duration::try_from(wait).unwrap_or(Duration::ZERO))
}

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use time::OffsetDateTime;

pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let Some(value) = value else {
		return serializer.serialize_none();
	};

	super::serialize(value, serializer)
}

/// `null` and a missing field both read as `None`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	Option::<String>::deserialize(deserializer)?
		.map(|raw| super::parse_timestamp(&raw).map_err(D::Error::custom))
		.transpose()
}

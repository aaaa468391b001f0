use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

/// Represents error types returned by the `Serde` module.
#[derive(thiserror::Error, Debug)]
pub enum SerdeError {
	/// The file could not be read or written.
	#[error("I/O error on {path}: {source}")]
	Io {
		/// File path
		path: String,
		/// Underlying error
		source: std::io::Error,
	},
	/// The file content is not the expected JSON.
	#[error("Invalid JSON in {path}: {source}")]
	Json {
		/// File path
		path: String,
		/// Underlying error
		source: serde_json::Error,
	},
	/// Null documents are rejected.
	#[error("Invalid Null document: {0}")]
	InvalidNullDocument(String),
}

/// Reads and parses a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SerdeError> {
	let path = path.as_ref();
	let display = path.display().to_string();
	let raw = fs::read(path).map_err(|source| SerdeError::Io { path: display.clone(), source })?;
	parse_json(&display, &raw)
}

/// Parses a JSON document, `origin` naming it in errors.
pub fn parse_json<T: DeserializeOwned>(origin: &str, raw: &[u8]) -> Result<T, SerdeError> {
	let value: serde_json::Value = serde_json::from_slice(raw)
		.map_err(|source| SerdeError::Json { path: origin.to_string(), source })?;
	if value.is_null() {
		return Err(SerdeError::InvalidNullDocument(origin.to_string()))
	}
	serde_json::from_value(value)
		.map_err(|source| SerdeError::Json { path: origin.to_string(), source })
}

/// Writes `value` as pretty printed JSON.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), SerdeError> {
	let path = path.as_ref();
	let display = path.display().to_string();
	let raw = serde_json::to_vec_pretty(value)
		.map_err(|source| SerdeError::Json { path: display.clone(), source })?;
	fs::write(path, raw).map_err(|source| SerdeError::Io { path: display, source })
}

/// `0x` prefixed hex of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without a `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
	hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

/// Handle serializing and deserializing from `Vec<u8>` to `0x` prefixed hexadecimal
pub mod as_hex {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	/// Serializes a `Vec<u8>` into a hexadecimal string
	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&super::to_hex(bytes))
	}

	/// Deserializes a hexadecimal string into a `Vec<u8>`
	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		super::from_hex(&s).map_err(|e| D::Error::custom(format!("Invalid hex {}: {}", s, e)))
	}
}

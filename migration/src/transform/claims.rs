use super::{Entry, MapRecord, TransformError, TransformedRecord};

/// Moves the entry under the destination prefix, value untouched.
pub(super) fn transform_claim(entry: &Entry) -> Result<TransformedRecord, TransformError> {
	Ok(TransformedRecord::Map(MapRecord {
		key: entry.destination_key.clone(),
		raw_key: entry.destination_key.get(32..).map(<[u8]>::to_vec).unwrap_or_default(),
		value: entry.value.to_vec(),
		auxiliary: None,
	}))
}

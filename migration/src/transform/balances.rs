use super::{decode_error, Entry, TransformError, TransformedRecord};
use common_primitives::node::Balance;
use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Re-encodes the issuance and checks it survives bit for bit.
pub(super) fn transform_total_issuance(entry: &Entry) -> Result<TransformedRecord, TransformError> {
	let old = Balance::decode_all(&mut &entry.value[..]).map_err(decode_error("Balance", entry))?;
	let value = old.encode();
	let new = Balance::decode(&mut &value[..]).map_err(decode_error("Balance", entry))?;
	if new != old || value != entry.value {
		return Err(TransformError::IssuanceMismatch { key: entry.hex_key(), expected: old, actual: new })
	}
	Ok(TransformedRecord::Value(value))
}

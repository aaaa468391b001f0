use super::{account_of, decode_error, Entry, MapRecord, TransformError, TransformedRecord};
use common_primitives::{balances::AccountInfo, storage::StorageHasher};
use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Folds `free + reserved` into a fresh destination account holding everything as free.
pub(super) fn transform_account(
	entry: &Entry,
	hasher: StorageHasher,
) -> Result<TransformedRecord, TransformError> {
	let account = account_of(entry, hasher)?;
	let old = AccountInfo::decode_all(&mut &entry.value[..]).map_err(decode_error("AccountInfo", entry))?;
	let total = old.total().ok_or_else(|| TransformError::Overflow(entry.hex_key()))?;

	let new = AccountInfo::with_free(total);
	let value = new.encode();

	let written = AccountInfo::decode(&mut &value[..]).map_err(decode_error("AccountInfo", entry))?;
	if written.data.free != total || written.data.reserved != 0 {
		return Err(TransformError::BalanceMismatch {
			key: entry.hex_key(),
			expected: total,
			actual: written.data.free,
		})
	}

	Ok(TransformedRecord::Map(MapRecord {
		key: entry.destination_key.clone(),
		raw_key: AsRef::<[u8]>::as_ref(&account).to_vec(),
		value,
		auxiliary: None,
	}))
}

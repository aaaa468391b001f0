use crate::{
	node::Hash,
	storage::{storage_prefix, ItemKey},
};
use parity_scale_codec::{Decode, Encode, Output};

/// When an event was emitted, the layout of `frame_system::Phase`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Phase {
	/// While applying the extrinsic at this position
	ApplyExtrinsic(u32),
	/// After the last extrinsic
	Finalization,
	/// Before the first extrinsic
	Initialization,
}

/// One entry of `System.Events`, its fields left SCALE encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
	/// Index of the extrinsic the event belongs to, `None` outside `ApplyExtrinsic`
	pub phase: Option<u32>,
	/// Pallet index
	pub pallet: u8,
	/// Event index within the pallet
	pub event: u8,
	/// SCALE encoded event fields
	pub data: Vec<u8>,
}

impl EventRecord {
	/// Whether this event was emitted by the extrinsic at `index`.
	pub fn is_for_extrinsic(&self, index: u32) -> bool {
		self.phase == Some(index)
	}

	/// Phase in its on-chain form.
	pub fn chain_phase(&self) -> Phase {
		match self.phase {
			Some(index) => Phase::ApplyExtrinsic(index),
			None => Phase::Finalization,
		}
	}
}

/// Encodes as `frame_system::EventRecord` without topics.
impl Encode for EventRecord {
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		self.chain_phase().encode_to(dest);
		self.pallet.encode_to(dest);
		self.event.encode_to(dest);
		dest.write(&self.data);
		Vec::<Hash>::new().encode_to(dest);
	}
}

/// `System.Events`, the records of the current block.
pub fn system_events_key() -> ItemKey {
	storage_prefix("System", "Events")
}

//! `System.Events` decoding.
//!
//! A record's event fields have no length prefix, so finding where one record ends takes the
//! event's type from the runtime's type registry. Fields are walked, not interpreted, and
//! handed on still encoded.

use crate::{error::ClientError, metadata::MetadataIndex};
use common_primitives::{
	events::{EventRecord, Phase},
	node::Hash,
};
use parity_scale_codec::{Compact, Decode};
use scale_info::{PortableRegistry, TypeDef, TypeDefPrimitive};

const WHAT: &str = "System.Events";

/// Decodes the value of `System.Events`.
pub fn decode_events(
	metadata: &MetadataIndex,
	raw: &[u8],
) -> Result<Vec<EventRecord>, ClientError> {
	let registry = metadata.types().ok_or_else(|| malformed("no type registry"))?;
	let input = &mut &raw[..];
	let count = decode::<Compact<u32>>(input)?.0;
	let mut records = Vec::new();
	for _ in 0..count {
		let phase = match decode::<Phase>(input)? {
			Phase::ApplyExtrinsic(index) => Some(index),
			Phase::Finalization | Phase::Initialization => None,
		};
		let pallet = decode::<u8>(input)?;
		let event = decode::<u8>(input)?;
		let event_type = metadata
			.pallet_at(pallet)
			.and_then(|info| info.event_type)
			.ok_or_else(|| malformed("event of a pallet without events"))?;
		let variant = match registry.resolve(event_type).map(|ty| &ty.type_def) {
			Some(TypeDef::Variant(def)) => def.variants.iter().find(|v| v.index == event),
			_ => None,
		}
		.ok_or_else(|| malformed("unknown event variant"))?;

		let fields = *input;
		for field in variant.fields.iter() {
			skip(registry, field.ty.id, input)?;
		}
		let data = fields[..fields.len() - input.len()].to_vec();
		decode::<Vec<Hash>>(input)?;
		records.push(EventRecord { phase, pallet, event, data });
	}
	Ok(records)
}

fn decode<T: Decode>(input: &mut &[u8]) -> Result<T, ClientError> {
	T::decode(input).map_err(|e| ClientError::decode(WHAT, e))
}

fn malformed(reason: &'static str) -> ClientError {
	ClientError::decode(WHAT, reason.into())
}

fn advance(input: &mut &[u8], len: usize) -> Result<(), ClientError> {
	match input.get(len..) {
		Some(rest) => {
			*input = rest;
			Ok(())
		},
		None => Err(malformed("unexpected end of input")),
	}
}

/// Moves `input` past one encoded value of type `id`.
fn skip(registry: &PortableRegistry, id: u32, input: &mut &[u8]) -> Result<(), ClientError> {
	let ty = registry.resolve(id).ok_or_else(|| malformed("unknown type id"))?;
	match &ty.type_def {
		TypeDef::Composite(def) => {
			for field in def.fields.iter() {
				skip(registry, field.ty.id, input)?;
			}
		},
		TypeDef::Variant(def) => {
			let index = decode::<u8>(input)?;
			let variant = def
				.variants
				.iter()
				.find(|variant| variant.index == index)
				.ok_or_else(|| malformed("unknown variant"))?;
			for field in variant.fields.iter() {
				skip(registry, field.ty.id, input)?;
			}
		},
		TypeDef::Sequence(def) => {
			let len = decode::<Compact<u32>>(input)?.0;
			for _ in 0..len {
				skip(registry, def.type_param.id, input)?;
			}
		},
		TypeDef::Array(def) => {
			for _ in 0..def.len {
				skip(registry, def.type_param.id, input)?;
			}
		},
		TypeDef::Tuple(def) => {
			for field in def.fields.iter() {
				skip(registry, field.id, input)?;
			}
		},
		TypeDef::Primitive(TypeDefPrimitive::Str) => {
			let len = decode::<Compact<u32>>(input)?.0;
			advance(input, len as usize)?;
		},
		TypeDef::Primitive(primitive) => advance(input, primitive_len(primitive))?,
		// every compact integer fits the u128 form
		TypeDef::Compact(_) => {
			decode::<Compact<u128>>(input)?;
		},
		TypeDef::BitSequence(def) => {
			let store = match registry.resolve(def.bit_store_type.id).map(|ty| &ty.type_def) {
				Some(TypeDef::Primitive(primitive)) => primitive_len(primitive),
				_ => return Err(malformed("bit store is not a primitive")),
			};
			if store == 0 {
				return Err(malformed("bit store is not a primitive"))
			}
			let bits = decode::<Compact<u32>>(input)?.0 as usize;
			let words = bits.div_ceil(store * 8);
			advance(input, words * store)?;
		},
	}
	Ok(())
}

fn primitive_len(primitive: &TypeDefPrimitive) -> usize {
	match primitive {
		TypeDefPrimitive::Bool | TypeDefPrimitive::U8 | TypeDefPrimitive::I8 => 1,
		TypeDefPrimitive::U16 | TypeDefPrimitive::I16 => 2,
		TypeDefPrimitive::Char | TypeDefPrimitive::U32 | TypeDefPrimitive::I32 => 4,
		TypeDefPrimitive::U64 | TypeDefPrimitive::I64 => 8,
		TypeDefPrimitive::U128 | TypeDefPrimitive::I128 => 16,
		TypeDefPrimitive::U256 | TypeDefPrimitive::I256 => 32,
		TypeDefPrimitive::Str => 0,
	}
}

use crate::serde::*;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
	#[serde(with = "as_hex")]
	key: Vec<u8>,
	count: u32,
}

#[test]
fn parse_json_reads_hex_fields() {
	let entry: Entry = parse_json("inline", br#"{"key":"0x0102ff","count":3}"#).unwrap();
	assert_eq!(entry, Entry { key: vec![1, 2, 255], count: 3 });
	assert_eq!(serde_json::to_string(&entry).unwrap(), r#"{"key":"0x0102ff","count":3}"#);
}

#[test]
fn parse_json_rejects_null_document() {
	let result = parse_json::<Entry>("inline", b"null");
	assert!(matches!(result, Err(SerdeError::InvalidNullDocument(_))));
}

#[test]
fn parse_json_reports_origin() {
	let err = parse_json::<Entry>("config.json", br#"{"key":"zz","count":1}"#).unwrap_err();
	assert!(err.to_string().contains("config.json"), "{}", err);
}

#[test]
fn hex_accepts_optional_prefix() {
	assert_eq!(from_hex("0xabcd").unwrap(), vec![0xab, 0xcd]);
	assert_eq!(from_hex("abcd").unwrap(), vec![0xab, 0xcd]);
	assert_eq!(to_hex(&[0, 1]), "0x0001");
}

#[test]
fn json_files_round_trip_through_disk() {
	let path = std::env::temp_dir().join(format!("helpers-{}.json", std::process::id()));
	let entry = Entry { key: vec![7; 4], count: 9 };
	write_json(&path, &entry).unwrap();
	let loaded: Entry = load_json(&path).unwrap();
	let _ = std::fs::remove_file(&path);
	assert_eq!(loaded, entry);

	let missing = load_json::<Entry>(std::env::temp_dir().join("does-not-exist-helpers.json"));
	assert!(matches!(missing, Err(SerdeError::Io { .. })));
}

//! Property tests for the marshalling schemes.
//!
//! Every scheme must parse back what it wrote and report exactly how many
//! bytes it consumed.

use plexus::{
    Bincode, Cbor, Cstr, Json, MarshallingScheme, MsgPack, Named, Parsed, SerializerParser,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// Cases per property
const PROPTEST_CASES: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    id: u32,
    name: String,
    values: Vec<i64>,
    flag: bool,
    note: Option<String>,
}

impl Named for Reading {
    const TYPE_NAME: &'static str = "Reading";
}

fn reading() -> impl Strategy<Value = Reading> {
    (
        any::<u32>(),
        ".{0,24}",
        prop::collection::vec(any::<i64>(), 0..16),
        any::<bool>(),
        prop::option::of("[a-z ]{0,12}"),
    )
        .prop_map(|(id, name, values, flag, note)| Reading {
            id,
            name,
            values,
            flag,
            note,
        })
}

/// Parses what `S` wrote and checks the consumed count.
fn check_single<S: MarshallingScheme>(value: &Reading) -> Result<(), TestCaseError>
where
    Reading: SerializerParser<S>,
{
    let bytes = SerializerParser::<S>::serialize(value).unwrap();
    let Parsed { value: parsed, consumed } =
        <Reading as SerializerParser<S>>::parse(&bytes, "Reading").unwrap();
    prop_assert_eq!(&parsed, value);
    prop_assert_eq!(consumed, bytes.len());
    Ok(())
}

/// Two values in one buffer split at the consumed count.
fn check_concatenated<S: MarshallingScheme>(
    first: &Reading,
    second: &Reading,
) -> Result<(), TestCaseError>
where
    Reading: SerializerParser<S>,
{
    let a = SerializerParser::<S>::serialize(first).unwrap();
    let b = SerializerParser::<S>::serialize(second).unwrap();
    let mut buffer = a.clone();
    buffer.extend_from_slice(&b);

    let head = <Reading as SerializerParser<S>>::parse(&buffer, "Reading").unwrap();
    prop_assert_eq!(&head.value, first);
    prop_assert_eq!(head.consumed, a.len());

    let tail = <Reading as SerializerParser<S>>::parse(&buffer[head.consumed..], "Reading").unwrap();
    prop_assert_eq!(&tail.value, second);
    prop_assert_eq!(tail.consumed, b.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn prop_json_single(value in reading()) {
        check_single::<Json>(&value)?;
    }

    #[test]
    fn prop_msgpack_single(value in reading()) {
        check_single::<MsgPack>(&value)?;
    }

    #[test]
    fn prop_cbor_single(value in reading()) {
        check_single::<Cbor>(&value)?;
    }

    #[test]
    fn prop_bincode_single(value in reading()) {
        check_single::<Bincode>(&value)?;
    }

    #[test]
    fn prop_concatenated_values_split(first in reading(), second in reading()) {
        check_concatenated::<Json>(&first, &second)?;
        check_concatenated::<MsgPack>(&first, &second)?;
        check_concatenated::<Cbor>(&first, &second)?;
        check_concatenated::<Bincode>(&first, &second)?;
    }

    /// A truncated buffer never parses as a full value.
    #[test]
    fn prop_truncated_msgpack_never_parses(value in reading(), cut in 1usize..8) {
        let bytes = SerializerParser::<MsgPack>::serialize(&value).unwrap();
        let end = bytes.len().saturating_sub(cut);
        prop_assert!(<Reading as SerializerParser<MsgPack>>::parse(&bytes[..end], "Reading").is_err());
    }

    #[test]
    fn prop_cstr_without_nul(text in "[^\u{0}]{0,64}") {
        let bytes = SerializerParser::<Cstr>::serialize(&text).unwrap();
        prop_assert_eq!(bytes.last(), Some(&0u8));
        let parsed = <String as SerializerParser<Cstr>>::parse(&bytes, "CSTR").unwrap();
        prop_assert_eq!(&parsed.value, &text);
        prop_assert_eq!(parsed.consumed, text.len() + 1);
    }

    #[test]
    fn prop_cstr_rejects_interior_nul(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
        let text = format!("{prefix}\0{suffix}");
        prop_assert!(SerializerParser::<Cstr>::serialize(&text).is_err());
    }
}

//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use crux_net_core::{Identity, Keypair, LocalKeyManager};

/// A 32-byte seed that is a valid secp256k1 scalar.
///
/// The first byte is kept below the curve order's leading byte so every
/// seed is accepted.
pub fn seed() -> impl Strategy<Value = [u8; 32]> {
    (1u8..=0xfe, any::<[u8; 31]>()).prop_map(|(head, tail)| {
        let mut seed = [0u8; 32];
        seed[0] = head;
        seed[1..].copy_from_slice(&tail);
        seed
    })
}

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    seed().prop_filter_map("seed outside curve order", |s| Keypair::from_seed(&s).ok())
}

pub fn key_manager() -> impl Strategy<Value = LocalKeyManager> {
    keypair().prop_map(LocalKeyManager::new)
}

/// Identities as they appear on topics.
pub fn identity() -> impl Strategy<Value = Identity> {
    "[a-z][a-z0-9_]{0,15}".prop_map(Identity::new)
}

/// Arbitrary JSON up to a small depth.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Content that satisfies the payment request schema.
pub fn payment_request() -> impl Strategy<Value = Value> {
    (
        "[0-9]{1,6}(\\.[0-9]{1,2})?",
        any::<u128>(),
        "0x[0-9a-f]{40}",
        proptest::option::of("[a-z0-9]{1,12}"),
    )
        .prop_map(|(amount, asset, hash, sec)| {
            let asset_id = uuid::Uuid::from_u128(asset).to_string();
            let mut to_address = json!({ "addressHash": hash });
            if let Some(sec) = sec {
                to_address["secIdentifier"] = json!(sec);
            }
            json!({ "amount": amount, "assetId": asset_id, "toAddress": to_address })
        })
}

/// Payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

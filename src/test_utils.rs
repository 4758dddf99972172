//! Common test utilities and fixtures.

use std::sync::Arc;

use crate::ledger::{Address, CardDuelLedger, InMemoryCoprocessor, HAND_SIZE};

/// Player ranks of the reference scripted deal.
pub const SCRIPTED_PLAYER: [u8; HAND_SIZE] = [3, 7, 1, 9, 5];
/// System ranks of the reference scripted deal, in reveal order.
pub const SCRIPTED_SYSTEM: [u8; HAND_SIZE] = [2, 8, 4, 6, 10];

pub const CONTRACT: Address = Address::new([0xcc; 20]);
pub const PLAYER: Address = Address::new([0x11; 20]);

/// A ledger whose next deal is the reference scripted deal.
pub fn scripted_ledger() -> (Arc<InMemoryCoprocessor>, Arc<CardDuelLedger>) {
    let coprocessor = Arc::new(InMemoryCoprocessor::new(7));
    coprocessor
        .script_deal(SCRIPTED_PLAYER, SCRIPTED_SYSTEM)
        .expect("reference deal is valid");
    let ledger = Arc::new(CardDuelLedger::new(CONTRACT, coprocessor.clone()));
    (coprocessor, ledger)
}

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }

    /// Assert that serde_json emits the same payload before and after round-tripping.
    pub fn assert_round_trip_json<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned,
    {
        let json = serde_json::to_value(value)
            .expect("serialization to value should succeed during round-trip testing");
        let restored: T = serde_json::from_value(json.clone())
            .expect("deserialization from value should succeed during round-trip testing");
        let json_after = serde_json::to_value(restored)
            .expect("re-serialization should succeed during round-trip testing");
        assert_eq!(json_after, json, "serde_json round-trip altered the payload");
    }
}

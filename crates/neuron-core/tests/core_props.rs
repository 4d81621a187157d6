//! Property tests for capacities and lock scripts

use neuron_core::{AddressBalance, Capacity, HashType, Script, H256};
use proptest::prelude::*;

proptest! {
    #[test]
    fn capacity_decimal_and_hex_agree(value in any::<u128>()) {
        let decimal: Capacity = value.to_string().parse().unwrap();
        let hex = Capacity::from_hex_str(&format!("0x{:x}", value)).unwrap();
        prop_assert_eq!(&decimal, &hex);
        prop_assert_eq!(decimal.to_string(), value.to_string());
    }

    #[test]
    fn balance_is_live_plus_sent(live in any::<u64>(), sent in any::<u64>(), pending in any::<u64>()) {
        let b = AddressBalance::new(0, Capacity::from(live), Capacity::from(sent), Capacity::from(pending));
        let expected: Capacity = (live as u128 + sent as u128).to_string().parse().unwrap();
        prop_assert_eq!(b.balance, expected);
    }

    #[test]
    fn script_length_tracks_args(args in proptest::collection::vec(any::<u8>(), 0..64)) {
        let script = Script {
            code_hash: H256([1u8; 32]),
            hash_type: HashType::Data1,
            args: args.clone(),
        };
        let bytes = script.serialize();
        prop_assert_eq!(bytes.len(), 53 + args.len());
        prop_assert_eq!(&bytes[53..], &args[..]);
    }
}

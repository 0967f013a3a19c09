//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealpost_core::{Address, Keypair, MessageIdentifier};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 32]>().prop_map(Address::from_bytes)
}

/// Generate an identifier under a random policy.
pub fn identifier() -> impl Strategy<Value = (Address, MessageIdentifier)> {
    (address(), any::<[u8; 16]>())
        .prop_map(|(policy, nonce)| (policy, MessageIdentifier::from_parts(&policy, &nonce)))
}

/// Generate `(threshold, total)` with `1 <= threshold <= total <= max_total`.
pub fn threshold_config(max_total: usize) -> impl Strategy<Value = (usize, usize)> {
    (1..=max_total.max(1)).prop_flat_map(|total| (1..=total, Just(total)))
}

/// Generate `count` distinct addresses.
pub fn distinct_addresses(count: usize) -> impl Strategy<Value = Vec<Address>> {
    prop::collection::hash_set(any::<[u8; 32]>(), count)
        .prop_map(|set| set.into_iter().map(Address::from_bytes).collect())
}

/// Generate message bytes of specified max length.
pub fn message(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn threshold_config_is_valid((threshold, total) in threshold_config(6)) {
            prop_assert!(threshold >= 1);
            prop_assert!(threshold <= total);
            prop_assert!(total <= 6);
        }

        #[test]
        fn identifier_is_prefixed((policy, id) in identifier()) {
            prop_assert!(id.belongs_to(&policy));
        }

        #[test]
        fn addresses_are_distinct(addrs in distinct_addresses(4)) {
            prop_assert_eq!(addrs.len(), 4);
        }
    }
}

//! Storage key derivation
//!
//! Keys are namespaced by address so independent account drivers never
//! touch the same entry.

use crate::models::{AccountAddress, Lt};
use tonhub_params::{ACCOUNT_KEY_PREFIX, LT_PAD_WIDTH, TRANSACTION_KEY_PREFIX};

/// Zero-pad a logical time so lexicographic order matches numeric order
pub fn pad_lt(lt: Lt) -> String {
    format!("{:0>width$}", lt.0, width = LT_PAD_WIDTH)
}

/// Key of the persisted status of `address`
pub fn account_key(address: &AccountAddress) -> String {
    format!("{ACCOUNT_KEY_PREFIX}{address}")
}

/// Key of one persisted transaction body
pub fn transaction_key(address: &AccountAddress, lt: Lt) -> String {
    format!("{}{}", transaction_prefix(address), pad_lt(lt))
}

/// Common prefix of every transaction key of `address`
pub fn transaction_prefix(address: &AccountAddress) -> String {
    format!("{TRANSACTION_KEY_PREFIX}{address}_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> AccountAddress {
        AccountAddress::parse(&format!("0:{}", "11".repeat(32))).unwrap()
    }

    #[test]
    fn test_pad_lt_width() {
        assert_eq!(pad_lt(Lt(0)), "00000000000000000000");
        assert_eq!(pad_lt(Lt(42)), "00000000000000000042");
        assert_eq!(pad_lt(Lt(u64::MAX)), u64::MAX.to_string());
    }

    #[test]
    fn test_padded_keys_sort_numerically() {
        let a = addr();
        let mut keys: Vec<String> = [9u64, 100, 10, 1_000_000_000_000]
            .iter()
            .map(|lt| transaction_key(&a, Lt(*lt)))
            .collect();
        keys.sort();
        let suffixes: Vec<u64> = keys
            .iter()
            .map(|k| k.rsplit('_').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(suffixes, vec![9, 10, 100, 1_000_000_000_000]);
    }

    #[test]
    fn test_key_layout() {
        let a = addr();
        assert_eq!(account_key(&a), format!("account_{a}"));
        assert_eq!(
            transaction_key(&a, Lt(5)),
            format!("tx_{a}_00000000000000000005")
        );
        assert!(transaction_key(&a, Lt(5)).starts_with(&transaction_prefix(&a)));
    }
}

//! Account sync models

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Logical time of a transaction
///
/// Encoded as a decimal string in JSON so values above 2^53 survive
/// JavaScript-era records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lt(pub u64);

impl fmt::Display for Lt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Lt)
            .map_err(|_| Error::Validation(format!("invalid logical time: {s:?}")))
    }
}

impl From<u64> for Lt {
    fn from(v: u64) -> Self {
        Lt(v)
    }
}

impl Serialize for Lt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Lt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>().map(Lt).map_err(de::Error::custom)
    }
}

/// Transaction identifier: logical time plus hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    /// Logical time
    pub lt: Lt,
    /// Transaction hash (base64)
    pub hash: String,
}

impl TransactionId {
    /// Create an identifier
    pub fn new(lt: u64, hash: impl Into<String>) -> Self {
        Self {
            lt: Lt(lt),
            hash: hash.into(),
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lt, self.hash)
    }
}

/// On-chain contract state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    /// Deployed contract
    Active,
    /// No code deployed yet
    Uninitialized,
    /// Frozen for unpaid storage
    Frozen,
}

impl AccountState {
    /// Lower-case name, as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Uninitialized => "uninitialized",
            Self::Frozen => "frozen",
        }
    }
}

impl FromStr for AccountState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "uninitialized" | "uninit" => Ok(Self::Uninitialized),
            "frozen" => Ok(Self::Frozen),
            other => Err(Error::Validation(format!("unknown account state: {other}"))),
        }
    }
}

/// Locally persisted sync status of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    /// Native balance in nanotons
    pub balance: BigUint,
    /// Contract state
    pub state: AccountState,
    /// Newest transaction known to the remote at last sync
    pub last_transaction: Option<TransactionId>,
    /// Server timestamp of the fetched state (unix seconds)
    pub sync_time: u64,
    /// Local wall-clock time of the last write (unix milliseconds)
    pub stored_at: i64,
    /// Count of transaction ids retained locally
    pub loaded_transactions: usize,
    /// Oldest loaded transaction when older history remains upstream
    pub transaction_cursor: Option<TransactionId>,
    /// Loaded transaction logical times, newest first
    pub transactions: Vec<Lt>,
}

impl AccountStatus {
    /// `true` once the whole remote history has been pulled in
    pub fn is_history_complete(&self) -> bool {
        self.transaction_cursor.is_none()
    }
}

/// A fetched transaction body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    /// Identifier
    pub id: TransactionId,
    /// Serialized transaction (base64 BOC)
    pub data: String,
}

/// Validated TON account address
///
/// Accepts the raw form `<workchain>:<64 hex chars>` and the 48-character
/// user-friendly form (base64 or base64url, CRC16 checked). The string is
/// kept as given since it namespaces storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// Parse and validate an address
    pub fn parse(src: &str) -> Result<Self> {
        let src = src.trim();
        if let Some((workchain, hash)) = src.split_once(':') {
            workchain
                .parse::<i32>()
                .map_err(|_| Error::Validation(format!("invalid workchain in {src:?}")))?;
            let bytes = hex::decode(hash)
                .map_err(|_| Error::Validation(format!("invalid account hash in {src:?}")))?;
            if bytes.len() != 32 {
                return Err(Error::Validation(format!("account hash must be 32 bytes: {src:?}")));
            }
            return Ok(Self(src.to_string()));
        }

        if src.len() != 48 {
            return Err(Error::Validation(format!("invalid address length: {src:?}")));
        }
        let bytes = URL_SAFE
            .decode(src)
            .or_else(|_| STANDARD.decode(src))
            .map_err(|_| Error::Validation(format!("invalid address encoding: {src:?}")))?;
        if bytes.len() != 36 {
            return Err(Error::Validation(format!("invalid address payload: {src:?}")));
        }
        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != expected {
            return Err(Error::Validation(format!("address checksum mismatch: {src:?}")));
        }
        Ok(Self(src.to_string()))
    }

    /// Address as given
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// CRC16/XMODEM as used by user-friendly addresses
const ADDRESS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

fn crc16(data: &[u8]) -> u16 {
    ADDRESS_CRC.checksum(data)
}

/// Parse a nanoton balance written as plain decimal digits
///
/// Signs, separators and fractions are rejected.
pub fn parse_balance(src: &str) -> Option<BigUint> {
    if src.is_empty() || !src.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(src.as_bytes(), 10)
}

#[cfg(test)]
pub(crate) fn friendly_address(workchain: i8, hash: [u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(36);
    bytes.push(0x11);
    bytes.push(workchain as u8);
    bytes.extend_from_slice(&hash);
    let crc = crc16(&bytes);
    bytes.extend_from_slice(&crc.to_be_bytes());
    URL_SAFE.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_xmodem_vector() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_parse_balance_digits_only() {
        assert_eq!(parse_balance("0"), Some(BigUint::from(0u8)));
        assert_eq!(
            parse_balance("18446744073709551616"),
            Some(BigUint::from(u64::MAX) + 1u8)
        );
        for bad in ["", "+7", "-5", "1_000", "12.5", " 1", "1e9", "0x10"] {
            assert_eq!(parse_balance(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_raw_address() {
        let raw = format!("0:{}", "ab".repeat(32));
        let addr = AccountAddress::parse(&raw).unwrap();
        assert_eq!(addr.as_str(), raw);

        let master = format!("-1:{}", "00".repeat(32));
        assert!(AccountAddress::parse(&master).is_ok());

        assert!(AccountAddress::parse("0:abcd").is_err());
        assert!(AccountAddress::parse(&format!("x:{}", "ab".repeat(32))).is_err());
    }

    #[test]
    fn test_friendly_address() {
        let friendly = friendly_address(0, [7u8; 32]);
        assert_eq!(friendly.len(), 48);
        assert!(AccountAddress::parse(&friendly).is_ok());

        // Flip one character of the hash part
        let mut broken: Vec<char> = friendly.chars().collect();
        broken[10] = if broken[10] == 'A' { 'B' } else { 'A' };
        let broken: String = broken.into_iter().collect();
        assert!(AccountAddress::parse(&broken).is_err());
    }

    #[test]
    fn test_lt_serde_as_string() {
        let id = TransactionId::new(u64::MAX, "aGFzaA==");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"lt":"18446744073709551615","hash":"aGFzaA=="}"#);
        let back: TransactionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_account_state_names() {
        for state in [AccountState::Active, AccountState::Uninitialized, AccountState::Frozen] {
            assert_eq!(state.as_str().parse::<AccountState>().unwrap(), state);
        }
        assert_eq!("uninit".parse::<AccountState>().unwrap(), AccountState::Uninitialized);
        assert!("nonexist".parse::<AccountState>().is_err());
    }
}

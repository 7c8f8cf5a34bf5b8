//! SS58 address handling.
//!
//! The same 32-byte account id is rendered differently on every chain (the
//! network prefix is part of the encoding). Session restoration compares the
//! decoded account id, never the rendered string.

use blake2::{Blake2b512, Digest};

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";

/// Decodes an address into its raw account id.
///
/// Accepts SS58 strings (checksum verified) and `0x`-prefixed hex ids.
/// Returns `None` for anything else.
pub fn decode(address: &str) -> Option<Vec<u8>> {
    if let Some(hex_id) = address.strip_prefix("0x") {
        return hex::decode(hex_id).ok();
    }

    let data = bs58::decode(address).into_vec().ok()?;
    let prefix_len = match data.first()? {
        0..=63 => 1,
        64..=127 => 2,
        _ => return None,
    };
    let checksum_len = match data.len().checked_sub(prefix_len)? {
        2 | 3 | 5 | 9 => 1,
        34 | 35 => 2,
        _ => return None,
    };

    let body_end = data.len() - checksum_len;
    let hash = checksum(&data[..body_end]);
    if hash[..checksum_len] != data[body_end..] {
        return None;
    }
    Some(data[prefix_len..body_end].to_vec())
}

/// Encodes `account_id` as an SS58 address for `prefix`.
///
/// Prefixes above 16383 are not representable and are masked.
pub fn encode(prefix: u16, account_id: &[u8]) -> String {
    let ident = prefix & 0b0011_1111_1111_1111;
    let mut data = match ident {
        0..=63 => vec![ident as u8],
        _ => {
            let first = (((ident & 0b0000_0000_1111_1100) as u8) >> 2) | 0b0100_0000;
            let second = ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first, second]
        }
    };
    data.extend_from_slice(account_id);

    let checksum_len = if matches!(account_id.len(), 32 | 33) { 2 } else { 1 };
    let hash = checksum(&data);
    data.extend_from_slice(&hash[..checksum_len]);
    bs58::encode(data).into_string()
}

/// Returns the account id of `address` as `0x`-prefixed lowercase hex.
pub fn public_key_hex(address: &str) -> Option<String> {
    decode(address).map(|id| format!("0x{}", hex::encode(id)))
}

/// Whether two addresses refer to the same account id.
///
/// Identical strings always match; otherwise both must decode.
pub fn same_identity(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (decode(a), decode(b)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

fn checksum(body: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(body);
    hasher.finalize().to_vec()
}

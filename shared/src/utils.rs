use crate::{Network, PoolError, PoolResult};

const TRON_ADDRESS_VERSION: u8 = 0x41;

fn is_hex(s: &str) -> bool {
  s.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn validate_address(network: Network, address: &str) -> PoolResult<()> {
  if network.is_evm() {
    let body = address
      .strip_prefix("0x")
      .ok_or_else(|| PoolError::InvalidAddress(format!("{} address must start with 0x", network)))?;
    if body.len() != 40 || !is_hex(body) {
      return Err(PoolError::InvalidAddress(format!(
        "{} address must be 40 hex characters after 0x",
        network
      )));
    }
    return Ok(());
  }

  // TRC20: base58check, 34 characters, 0x41 version byte renders as a leading 'T'.
  if address.len() != 34 || !address.starts_with('T') {
    return Err(PoolError::InvalidAddress(
      "TRC20 address must be 34 characters starting with T".to_string(),
    ));
  }
  let decoded = bs58::decode(address)
    .with_check(Some(TRON_ADDRESS_VERSION))
    .into_vec()
    .map_err(|e| PoolError::InvalidAddress(format!("Invalid base58check: {}", e)))?;
  // Version byte plus 20-byte account id; the checksum is stripped.
  if decoded.len() != 21 {
    return Err(PoolError::InvalidAddress(
      "TRC20 address has an unexpected payload".to_string(),
    ));
  }
  Ok(())
}

/// EVM hashes are 0x + 64 hex; TRON transaction ids are bare 64 hex.
pub fn validate_tx_hash(network: Network, tx_hash: &str) -> PoolResult<String> {
  let trimmed = tx_hash.trim();
  let body = if network.is_evm() {
    trimmed
      .strip_prefix("0x")
      .ok_or_else(|| PoolError::InvalidTxHash(format!("{} hash must start with 0x", network)))?
  } else {
    trimmed
  };

  if body.len() != 64 || !is_hex(body) {
    return Err(PoolError::InvalidTxHash(
      "Hash must be 64 hex characters".to_string(),
    ));
  }

  Ok(trimmed.to_lowercase())
}

pub fn validate_amount(amount: i64) -> PoolResult<i64> {
  if amount <= 0 {
    return Err(PoolError::InvalidAmount(
      "Amount must be greater than zero".to_string(),
    ));
  }

  Ok(amount)
}

pub fn base_units_to_usdt(amount: i64) -> f64 {
  amount as f64 / 1_000_000.0
}

pub fn format_usdt(amount: i64) -> String {
  format!("{:.6} USDT" , base_units_to_usdt(amount))
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Opaque identifier generation.

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

const EXECUTION_ID_BYTES: usize = 12;
const PURCHASE_TOKEN_BYTES: usize = 32;

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;
    Ok(bytes)
}

/// New execution id: 24 lowercase hex characters.
pub fn new_execution_id() -> Result<String> {
    Ok(hex::encode(random_bytes::<EXECUTION_ID_BYTES>()?))
}

/// New purchase token string (URL-safe, unpadded).
pub fn new_purchase_token() -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<PURCHASE_TOKEN_BYTES>()?))
}

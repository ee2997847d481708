//! Core OTP generation and validation — RFC 4226 (HOTP) and RFC 6238 (TOTP).
//!
//! Implements HMAC-based One-Time Password with SHA-1, SHA-256, and
//! SHA-512, time-step calculation, and window-bounded validation: a
//! forward counter scan for HOTP and a centre-outward time-step scan for
//! TOTP, driven either by a literal OTP or by a comparison callback.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::otp::types::{Algorithm, OathError};

/// Time-step applied when a caller passes a step size of 0.
pub const DEFAULT_TIME_STEP: u32 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generation (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute an OTP for the given raw key bytes and moving factor.
///
/// The digit count is checked before any HMAC work; only 6, 7 and 8 are
/// defined for the truncation below.
pub fn generate(key: &[u8], moving_factor: u64, digits: u8, algo: Algorithm) -> Result<String, OathError> {
    if !(6..=8).contains(&digits) {
        return Err(OathError::InvalidDigits(digits));
    }
    let hmac_result = compute_hmac(key, &moving_factor.to_be_bytes(), algo)?;
    Ok(truncate(&hmac_result, digits))
}

/// Compute HMAC(key, message) using the specified algorithm.
fn compute_hmac(key: &[u8], data: &[u8], algo: Algorithm) -> Result<Vec<u8>, OathError> {
    match algo {
        Algorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| OathError::Crypto)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        Algorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| OathError::Crypto)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        Algorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(|_| OathError::Crypto)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Dynamic truncation per RFC 4226 §5.3: low nibble of the last byte
/// selects the offset, the top bit of the extracted word is masked off.
fn truncate(hmac_result: &[u8], digits: u8) -> String {
    let offset = (hmac_result[hmac_result.len() - 1] & 0x0f) as usize;
    let binary = ((hmac_result[offset] as u32 & 0x7f) << 24)
        | ((hmac_result[offset + 1] as u32) << 16)
        | ((hmac_result[offset + 2] as u32) << 8)
        | (hmac_result[offset + 3] as u32);
    let code = binary % 10u32.pow(digits as u32);
    format!("{:0>width$}", code, width = digits as usize)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Comparison callback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decides whether a generated candidate matches the submitted OTP.
///
/// `Ok(true)` accepts the candidate, `Ok(false)` continues the window
/// scan, and `Err` aborts it, surfacing as [`OathError::Compare`].
/// Implementations can close over a hashed OTP or an external verifier;
/// the candidate itself is never retained.
pub trait OtpComparator {
    fn compare(&mut self, candidate: &str) -> Result<bool, String>;
}

impl<F> OtpComparator for F
where
    F: FnMut(&str) -> Result<bool, String>,
{
    fn compare(&mut self, candidate: &str) -> Result<bool, String> {
        self(candidate)
    }
}

/// Constant-time comparison (to prevent timing attacks on code verification).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  HOTP validation (counter-based, RFC 4226)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Search counters `start..=start+window` for an accepted candidate.
///
/// Returns the relative position of the first match. The scan is forward
/// only; exhausting the window is `InvalidOtp`.
pub fn hotp_validate<C: OtpComparator>(
    key: &[u8],
    start: u64,
    window: u32,
    digits: u8,
    mut cmp: C,
) -> Result<u64, OathError> {
    for iter in 0..=window as u64 {
        let candidate = generate(key, start + iter, digits, Algorithm::Sha1)?;
        match cmp.compare(&candidate) {
            Ok(true) => return Ok(iter),
            Ok(false) => {}
            Err(msg) => return Err(OathError::Compare(msg)),
        }
    }
    Err(OathError::InvalidOtp)
}

/// Validate a literal OTP string against the counter window.
///
/// The digit count is taken from the submitted string, as in plain
/// RFC 4226 validation; unsupported lengths fail as `InvalidDigits`.
pub fn hotp_validate_str(key: &[u8], start: u64, window: u32, otp: &str) -> Result<u64, OathError> {
    let digits = u8::try_from(otp.len()).unwrap_or(0);
    hotp_validate(key, start, window, digits, |candidate: &str| {
        Ok(constant_time_eq(candidate.as_bytes(), otp.as_bytes()))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TOTP (time-based, RFC 6238)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the time-step counter for a unix timestamp.
///
/// A step size of 0 means [`DEFAULT_TIME_STEP`]. A clock before the
/// start offset clamps to step 0.
pub fn totp_timestep(now: i64, start_offset: i64, step: u32) -> u64 {
    let step = if step == 0 { DEFAULT_TIME_STEP } else { step };
    let elapsed = now.saturating_sub(start_offset).max(0);
    (elapsed / step as i64) as u64
}

/// Generate a TOTP code at an explicit unix timestamp.
pub fn totp_generate_at(
    key: &[u8],
    now: i64,
    step: u32,
    start_offset: i64,
    digits: u8,
    algo: Algorithm,
) -> Result<String, OathError> {
    generate(key, totp_timestep(now, start_offset, step), digits, algo)
}

/// Generate a TOTP code at the current wall-clock time.
pub fn totp_generate(
    key: &[u8],
    step: u32,
    start_offset: i64,
    digits: u8,
    algo: Algorithm,
) -> Result<String, OathError> {
    totp_generate_at(key, current_unix_time(), step, start_offset, digits, algo)
}

/// Search time-steps around "now" for an accepted candidate.
///
/// The scan is centre-outward: radius 0 tests only the current step;
/// each larger radius tests the future step before the past one, so a
/// positive position wins when both directions would match. Returns the
/// signed position and the absolute counter that matched.
pub fn totp_validate<C: OtpComparator>(
    key: &[u8],
    now: i64,
    step: u32,
    start_offset: i64,
    digits: u8,
    window: u32,
    mut cmp: C,
) -> Result<(i64, u64), OathError> {
    let nts = totp_timestep(now, start_offset, step);
    for iter in 0..=window as u64 {
        let counter = nts + iter;
        let candidate = generate(key, counter, digits, Algorithm::Sha1)?;
        match cmp.compare(&candidate) {
            Ok(true) => return Ok((iter as i64, counter)),
            Ok(false) => {}
            Err(msg) => return Err(OathError::Compare(msg)),
        }
        // Past steps exist only once the radius is non-zero and the
        // counter does not underflow.
        if iter > 0 && iter <= nts {
            let counter = nts - iter;
            let candidate = generate(key, counter, digits, Algorithm::Sha1)?;
            match cmp.compare(&candidate) {
                Ok(true) => return Ok((-(iter as i64), counter)),
                Ok(false) => {}
                Err(msg) => return Err(OathError::Compare(msg)),
            }
        }
    }
    Err(OathError::InvalidOtp)
}

/// Validate a literal OTP string against the time window.
pub fn totp_validate_str(
    key: &[u8],
    now: i64,
    step: u32,
    start_offset: i64,
    window: u32,
    otp: &str,
) -> Result<(i64, u64), OathError> {
    let digits = u8::try_from(otp.len()).unwrap_or(0);
    totp_validate(key, now, step, start_offset, digits, window, |candidate: &str| {
        Ok(constant_time_eq(candidate.as_bytes(), otp.as_bytes()))
    })
}

/// Current unix timestamp in seconds.
pub(crate) fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

//! OTP crate: sub-modules.

pub mod codec;
pub mod core;
pub mod store;
pub mod types;

// Re-export top-level items for convenience.
pub use self::codec::{
    base32_decode, base32_encode, bin2hex, hex_decode, hex_decode_into, hex_decoded_len,
};
pub use self::core::{
    constant_time_eq, generate, hotp_validate, hotp_validate_str, totp_generate, totp_generate_at,
    totp_timestep, totp_validate, totp_validate_str, OtpComparator, DEFAULT_TIME_STEP,
};
pub use self::store::{authenticate, authenticate_at, TIMESTAMP_FORMAT};
pub use self::types::*;

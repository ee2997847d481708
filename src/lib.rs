//! # otp-auth – HOTP / TOTP authentication core
//!
//! One-time-password authentication against a flat-file credential store:
//!
//! - **RFC 4226 / 6238** – HOTP & TOTP generation with SHA-1, SHA-256, SHA-512
//! - **Window validation** – forward counter search (HOTP) and centre-outward
//!   time-step search (TOTP), against a literal OTP or a comparison callback
//! - **Secret codecs** – hex with a two-phase buffer protocol, base32 with
//!   whitespace and padding normalisation
//! - **Credential store** – line-oriented multi-user database with password
//!   policy, multi-token accounts, and replay detection
//! - **Crash-safe updates** – lock-protected write-new-then-rename commits
//!   that never leave the store half-written

pub mod otp;

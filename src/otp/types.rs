//! Core types for OTP authentication and the credential store.

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Algorithm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash algorithm used for HMAC-based OTP generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Sha1
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "SHA1"),
            Self::Sha256 => write!(f, "SHA256"),
            Self::Sha512 => write!(f, "SHA512"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Token type tags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether a credential line is counter-based or time-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Event/counter mode (`HOTP`, `HOTP/E`).
    Hotp,
    /// Time mode with a fixed step (`HOTP/T30`, `HOTP/T60`).
    Totp { step_seconds: u32 },
}

/// A parsed credential-file token tag.
///
/// The tag grammar is `HOTP`, `HOTP/E[/digits]`, `HOTP/T30[/digits]` and
/// `HOTP/T60[/digits]` with digits in 6..=8 (default 6). Every tag denotes
/// a SHA-1 token; no other digest is expressible in the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenType {
    pub kind: TokenKind,
    pub digits: u8,
}

impl TokenType {
    /// Parse a token tag. `None` means the tag is not one of ours, in
    /// which case the surrounding line is not a credential record.
    pub fn parse(tag: &str) -> Option<Self> {
        let rest = tag.strip_prefix("HOTP")?;
        if rest.is_empty() {
            return Some(Self { kind: TokenKind::Hotp, digits: 6 });
        }
        let mut parts = rest.strip_prefix('/')?.split('/');
        let kind = match parts.next()? {
            "E" => TokenKind::Hotp,
            "T30" => TokenKind::Totp { step_seconds: 30 },
            "T60" => TokenKind::Totp { step_seconds: 60 },
            _ => return None,
        };
        let digits = match parts.next() {
            None => 6,
            Some("6") => 6,
            Some("7") => 7,
            Some("8") => 8,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { kind, digits })
    }

    /// Step size in seconds, for time-mode tokens.
    pub fn step_seconds(&self) -> Option<u32> {
        match self.kind {
            TokenKind::Hotp => None,
            TokenKind::Totp { step_seconds } => Some(step_seconds),
        }
    }

    pub fn is_time_based(&self) -> bool {
        matches!(self.kind, TokenKind::Totp { .. })
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Hotp => write!(f, "HOTP/E/{}", self.digits),
            TokenKind::Totp { step_seconds } => write!(f, "HOTP/T{}/{}", step_seconds, self.digits),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Password policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-record password rule, from the third credential-file field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordPolicy {
    /// Stored `-`: no password required; supplying one is a mismatch.
    NotRequired,
    /// Stored `+`: verified elsewhere, always passes.
    External,
    /// Any other stored value: byte-equality required.
    Literal(String),
}

impl PasswordPolicy {
    pub fn from_field(field: &str) -> Self {
        match field {
            "-" => Self::NotRequired,
            "+" => Self::External,
            other => Self::Literal(other.to_string()),
        }
    }

    /// The credential-file spelling of this policy.
    pub fn as_field(&self) -> &str {
        match self {
            Self::NotRequired => "-",
            Self::External => "+",
            Self::Literal(s) => s,
        }
    }

    /// Whether a caller-supplied password satisfies this record.
    pub fn accepts(&self, supplied: &str) -> bool {
        match self {
            Self::NotRequired => supplied.is_empty(),
            Self::External => true,
            Self::Literal(stored) => stored == supplied,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Credential record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One parsed line of the credential store.
///
/// `raw_type` keeps the tag exactly as it appeared so a rewrite can
/// re-emit it unchanged. The optional trailing fields carry the token's
/// authentication state: last accepted counter, last accepted OTP, and
/// the local time of the last acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub token_type: TokenType,
    pub raw_type: String,
    pub username: String,
    pub password: PasswordPolicy,
    pub secret_hex: String,
    pub counter: Option<u64>,
    pub last_otp: Option<String>,
    pub last_use: Option<NaiveDateTime>,
    /// Zero-based position of this record's line in the file.
    pub line_index: usize,
}

impl CredentialRecord {
    /// Render the post-authentication replacement line: the original
    /// identity fields, then the new state, tab-separated.
    pub fn updated_line(&self, new_counter: u64, otp: &str, timestamp: &str) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.raw_type,
            self.username,
            self.password.as_field(),
            self.secret_hex,
            new_counter,
            otp,
            timestamp
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Crate-level error.
///
/// Policy outcomes (`BadPassword`, `UnknownUser`, `InvalidOtp`,
/// `ReplayedOtp`) are expected results of an authentication attempt;
/// callers mapping to PAM-style decisions should treat them as denial
/// and everything I/O-shaped as service-unavailable.
#[derive(Debug, Error)]
pub enum OathError {
    #[error("{0} is not a supported digit count (must be 6, 7 or 8)")]
    InvalidDigits(u8),

    #[error("invalid hex secret: {0}")]
    InvalidHex(String),

    #[error("decode buffer too small: {required} bytes required, {provided} available")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("invalid base32 secret: {0}")]
    InvalidBase32(String),

    #[error("invalid counter field {0:?}")]
    InvalidCounter(String),

    #[error("invalid timestamp field {0:?}")]
    InvalidTimestamp(String),

    #[error("HMAC digest computation failed")]
    Crypto,

    #[error("comparison callback failed: {0}")]
    Compare(String),

    #[error("OTP did not match any position in the search window")]
    InvalidOtp,

    #[error("OTP was already used")]
    ReplayedOtp { last_use: Option<NaiveDateTime> },

    #[error("password does not match")]
    BadPassword,

    #[error("no matching credential on file for the user")]
    UnknownUser,

    #[error("credential file {} does not exist", .0.display())]
    NoSuchFile(PathBuf),

    #[error("reading {}: {source}", .path.display())]
    ReadFile { path: PathBuf, source: io::Error },

    #[error("locking {}: {source}", .path.display())]
    LockFile { path: PathBuf, source: io::Error },

    #[error("writing {}: {source}", .path.display())]
    WriteFile { path: PathBuf, source: io::Error },

    #[error("renaming {} onto {}: {source}", .from.display(), .to.display())]
    RenameFile { from: PathBuf, to: PathBuf, source: io::Error },

    #[error("removing {}: {source}", .path.display())]
    RemoveFile { path: PathBuf, source: io::Error },
}

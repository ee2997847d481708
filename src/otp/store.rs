//! Flat-file credential store.
//!
//! Each line of the store maps a username to a token tag, a password
//! rule, a hex secret, and the token's authentication state. A
//! successful authentication rewrites the file through a lock-protected
//! write-new-then-rename commit, so the store is always either the old
//! content or the new content, never a torn write.
//!
//! The read-and-validate phase runs before the lock is taken. Two racing
//! processes can therefore both validate against the same stored state;
//! the loser's rename still succeeds and the file stays well-formed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Utc};
use fs2::FileExt;

use crate::otp::codec;
use crate::otp::core;
use crate::otp::types::{CredentialRecord, OathError, PasswordPolicy, TokenKind, TokenType};

/// On-disk shape of the last-use field, e.g. `2026-02-07T09:31:04L`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SL";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Authentication
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Authenticate `username`'s submitted OTP against the credential file.
///
/// `window` is the number of counter or time positions searched beyond
/// the expected one. `password` of `None` skips password policy
/// entirely; `Some` is checked against each record's stored rule.
///
/// On success the matching record's counter, last-OTP and last-use
/// fields have been committed to disk before this returns.
pub fn authenticate(
    path: impl AsRef<Path>,
    username: &str,
    otp: &str,
    window: u32,
    password: Option<&str>,
) -> Result<(), OathError> {
    authenticate_at(path, username, otp, window, password, Utc::now().timestamp())
}

/// [`authenticate`] with an explicit "now".
///
/// One snapshot of `now` drives both the time-step search and the
/// position replay comparison within a single call.
pub fn authenticate_at(
    path: impl AsRef<Path>,
    username: &str,
    otp: &str,
    window: u32,
    password: Option<&str>,
    now: i64,
) -> Result<(), OathError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            OathError::NoSuchFile(path.to_path_buf())
        } else {
            OathError::ReadFile { path: path.to_path_buf(), source: e }
        }
    })?;

    let (record, new_counter) = scan_records(&mut file, path, username, otp, window, password, now)?;

    // Atomic update: rewind the open handle, then serialise the rewrite
    // behind the lock file.
    file.seek(SeekFrom::Start(0))
        .map_err(|e| OathError::ReadFile { path: path.to_path_buf(), source: e })?;
    let lock = LockGuard::acquire(&sibling_path(path, ".lock"))?;
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let updated = record.updated_line(new_counter, otp, &timestamp);
    rewrite_through(path, &mut file, record.line_index, &updated)?;
    lock.release()?;
    log::info!(
        "committed credential state for user {} (line {}, counter {})",
        username,
        record.line_index,
        new_counter
    );
    Ok(())
}

/// Scan the file for a record that accepts the submitted OTP.
///
/// Returns the accepted record and its new counter value, or the most
/// specific policy outcome the scan produced.
fn scan_records(
    file: &mut File,
    path: &Path,
    username: &str,
    otp: &str,
    window: u32,
    password: Option<&str>,
    now: i64,
) -> Result<(CredentialRecord, u64), OathError> {
    let mut reader = BufReader::new(file);
    let mut bad_password = false;
    let mut invalid_otp = false;
    let mut buf = Vec::new();
    let mut index = 0usize;

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| OathError::ReadFile { path: path.to_path_buf(), source: e })?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line_index = index;
        index += 1;

        let Some(record) = parse_record(&line, username, line_index)? else {
            continue;
        };

        if let Some(supplied) = password {
            if !record.password.accepts(supplied) {
                log::debug!("password mismatch on line {}, skipping", line_index);
                bad_password = true;
                continue;
            }
        }

        // A secret that does not decode poisons the whole file.
        let key = codec::hex_decode(&record.secret_hex)?;

        // First replay defense: the literal OTP was accepted before.
        if record.last_otp.as_deref() == Some(otp) {
            return Err(OathError::ReplayedOtp { last_use: record.last_use });
        }

        let outcome = match record.token_type.kind {
            TokenKind::Hotp => {
                let start = record.counter.unwrap_or(0);
                core::hotp_validate_str(&key, start, window, otp).map(|pos| start + pos)
            }
            TokenKind::Totp { step_seconds } => {
                core::totp_validate_str(&key, now, step_seconds, 0, window, otp).and_then(
                    |(pos, counter)| {
                        // Second replay defense, time mode only: a match
                        // at or before the last accepted step is stale
                        // even though the literal OTP differs.
                        if let Some(prev) = record.counter {
                            if counter <= prev {
                                return Err(OathError::ReplayedOtp { last_use: record.last_use });
                            }
                        }
                        log::debug!("time-step match at position {} on line {}", pos, line_index);
                        Ok(counter)
                    },
                )
            }
        };

        match outcome {
            Ok(new_counter) => return Ok((record, new_counter)),
            Err(OathError::InvalidOtp) => {
                log::debug!("no window match on line {}, skipping", line_index);
                invalid_otp = true;
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    // Report the most specific reason the scan came up empty.
    if bad_password {
        Err(OathError::BadPassword)
    } else if invalid_otp {
        Err(OathError::InvalidOtp)
    } else {
        Err(OathError::UnknownUser)
    }
}

/// Parse one line as a credential record for `username`.
///
/// `Ok(None)` covers everything that is not a record for this user:
/// too few fields, an unknown token tag, or another username. Field
/// errors are only possible on the user's own records and are fatal.
fn parse_record(
    line: &str,
    username: &str,
    line_index: usize,
) -> Result<Option<CredentialRecord>, OathError> {
    let mut tokens = line.split_whitespace();
    let (Some(raw_type), Some(user), Some(passwd), Some(secret)) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Ok(None);
    };
    let Some(token_type) = TokenType::parse(raw_type) else {
        return Ok(None);
    };
    if user != username {
        return Ok(None);
    }

    let counter = match tokens.next() {
        None => None,
        Some(tok) => Some(
            tok.parse::<u64>()
                .map_err(|_| OathError::InvalidCounter(tok.to_string()))?,
        ),
    };
    let last_otp = tokens.next().map(str::to_string);
    let last_use = match tokens.next() {
        None => None,
        Some(tok) => Some(
            NaiveDateTime::parse_from_str(tok, TIMESTAMP_FORMAT)
                .map_err(|_| OathError::InvalidTimestamp(tok.to_string()))?,
        ),
    };

    Ok(Some(CredentialRecord {
        token_type,
        raw_type: raw_type.to_string(),
        username: user.to_string(),
        password: PasswordPolicy::from_field(passwd),
        secret_hex: secret.to_string(),
        counter,
        last_otp,
        last_use,
        line_index,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Atomic rewrite
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stream the rewound input into `<path>.new` with one line replaced,
/// make it durable, and rename it onto `path`.
///
/// Any failure removes the partial `.new` file and leaves the original
/// untouched.
fn rewrite_through(
    path: &Path,
    input: &mut File,
    updated_index: usize,
    updated_line: &str,
) -> Result<(), OathError> {
    let new_path = sibling_path(path, ".new");
    if let Err(e) = write_new_file(path, &new_path, input, updated_index, updated_line) {
        let _ = fs::remove_file(&new_path);
        return Err(e);
    }
    if let Err(e) = fs::rename(&new_path, path) {
        let _ = fs::remove_file(&new_path);
        return Err(OathError::RenameFile {
            from: new_path,
            to: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

fn write_new_file(
    path: &Path,
    new_path: &Path,
    input: &mut File,
    updated_index: usize,
    updated_line: &str,
) -> Result<(), OathError> {
    let write_err = |e| OathError::WriteFile { path: new_path.to_path_buf(), source: e };
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let out = opts.open(new_path).map_err(write_err)?;
    let mut writer = BufWriter::new(out);
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    let mut index = 0usize;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| OathError::ReadFile { path: path.to_path_buf(), source: e })?;
        if n == 0 {
            break;
        }
        if index == updated_index {
            writer.write_all(updated_line.as_bytes()).map_err(write_err)?;
            if buf.ends_with(b"\n") {
                writer.write_all(b"\n").map_err(write_err)?;
            }
        } else {
            // Untouched lines are copied byte-for-byte, parseable or not.
            writer.write_all(&buf).map_err(write_err)?;
        }
        index += 1;
    }
    // Durability before the rename, not after.
    writer.flush().map_err(write_err)?;
    writer.get_ref().sync_all().map_err(write_err)?;
    Ok(())
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Lock file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds an exclusive advisory lock on `<path>.lock` for the duration
/// of one rewrite. Dropping the guard unlinks the lock file; the
/// explicit [`LockGuard::release`] surfaces unlink errors on the
/// success path.
struct LockGuard {
    file: File,
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self, OathError> {
        let lock_err = |e| OathError::LockFile { path: path.to_path_buf(), source: e };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .map_err(lock_err)?;
        loop {
            match file.lock_exclusive() {
                Ok(()) => break,
                // A signal can interrupt the blocking acquisition.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(lock_err(e)),
            }
        }
        Ok(Self { file, path: path.to_path_buf(), released: false })
    }

    fn release(mut self) -> Result<(), OathError> {
        self.released = true;
        fs::remove_file(&self.path)
            .map_err(|e| OathError::RemoveFile { path: self.path.clone(), source: e })?;
        self.file
            .unlock()
            .map_err(|e| OathError::LockFile { path: self.path.clone(), source: e })?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
            let _ = self.file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    // RFC 4226 test secret "12345678901234567890" and its first codes.
    const SECRET_HEX: &str = "3132333435363738393031323334353637383930";
    const CODES: [&str; 10] = [
        "755224", "287082", "359152", "969429", "338314",
        "254676", "287922", "162583", "399871", "520489",
    ];

    fn write_store(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("users.otp");
        fs::write(&path, contents).unwrap();
        path
    }

    fn read_store(path: &Path) -> String {
        let mut s = String::new();
        File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    // ── Record parsing ───────────────────────────────────────────

    #[test]
    fn parse_minimal_record() {
        let record = parse_record("HOTP alice - 00aa", "alice", 0).unwrap().unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.raw_type, "HOTP");
        assert_eq!(record.secret_hex, "00aa");
        assert_eq!(record.counter, None);
        assert_eq!(record.last_otp, None);
        assert_eq!(record.last_use, None);
    }

    #[test]
    fn parse_full_record() {
        let line = "HOTP/T30/8\tbob\thunter2\t00aa\t42\t755224\t2026-02-07T09:31:04L";
        let record = parse_record(line, "bob", 3).unwrap().unwrap();
        assert_eq!(record.token_type.step_seconds(), Some(30));
        assert_eq!(record.token_type.digits, 8);
        assert_eq!(record.password, PasswordPolicy::Literal("hunter2".into()));
        assert_eq!(record.counter, Some(42));
        assert_eq!(record.last_otp.as_deref(), Some("755224"));
        let ts = record.last_use.unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2026-02-07T09:31:04L");
        assert_eq!(record.line_index, 3);
    }

    #[test]
    fn parse_skips_foreign_lines() {
        assert!(parse_record("# comment", "alice", 0).unwrap().is_none());
        assert!(parse_record("", "alice", 0).unwrap().is_none());
        assert!(parse_record("TOTP alice - 00aa", "alice", 0).unwrap().is_none());
        assert!(parse_record("HOTP bob - 00aa", "alice", 0).unwrap().is_none());
        assert!(parse_record("HOTP alice -", "alice", 0).unwrap().is_none());
    }

    #[test]
    fn parse_rejects_bad_counter() {
        let err = parse_record("HOTP alice - 00aa 12x", "alice", 0).unwrap_err();
        assert!(matches!(err, OathError::InvalidCounter(ref s) if s == "12x"));
    }

    #[test]
    fn parse_rejects_bad_timestamp() {
        let err = parse_record("HOTP alice - 00aa 1 755224 yesterday", "alice", 0).unwrap_err();
        assert!(matches!(err, OathError::InvalidTimestamp(_)));
    }

    // ── HOTP authentication ──────────────────────────────────────

    #[test]
    fn hotp_accepts_and_commits_state() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));

        authenticate(&path, "alice", CODES[0], 5, None).unwrap();

        let contents = read_store(&path);
        let mut fields = contents.trim_end().split('\t');
        assert_eq!(fields.next(), Some("HOTP"));
        assert_eq!(fields.next(), Some("alice"));
        assert_eq!(fields.next(), Some("-"));
        assert_eq!(fields.next(), Some(SECRET_HEX));
        assert_eq!(fields.next(), Some("0"));
        assert_eq!(fields.next(), Some(CODES[0]));
        let ts = fields.next().unwrap();
        NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap();
        assert!(!sibling_path(&path, ".new").exists());
        assert!(!sibling_path(&path, ".lock").exists());
    }

    #[test]
    fn hotp_counter_advances_by_position() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));

        // The code at counter 3 sits at position 3 of the window.
        authenticate(&path, "alice", CODES[3], 5, None).unwrap();
        let contents = read_store(&path);
        assert_eq!(contents.split('\t').nth(4), Some("3"));

        // The next accepted code searches forward from the new counter.
        authenticate(&path, "alice", CODES[4], 5, None).unwrap();
        let contents = read_store(&path);
        assert_eq!(contents.split('\t').nth(4), Some("4"));
    }

    #[test]
    fn hotp_rejects_beyond_window() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));
        let before = read_store(&path);

        let err = authenticate(&path, "alice", CODES[6], 5, None).unwrap_err();
        assert!(matches!(err, OathError::InvalidOtp));
        assert_eq!(read_store(&path), before, "a failed attempt must not rewrite");
    }

    #[test]
    fn replayed_otp_carries_first_success_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));

        authenticate(&path, "alice", CODES[0], 5, None).unwrap();
        let written = read_store(&path);
        let written_ts = written.trim_end().split('\t').nth(6).unwrap().to_string();

        let err = authenticate(&path, "alice", CODES[0], 5, None).unwrap_err();
        match err {
            OathError::ReplayedOtp { last_use: Some(ts) } => {
                assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), written_ts);
            }
            other => panic!("expected ReplayedOtp with timestamp, got {:?}", other),
        }
        assert_eq!(read_store(&path), written, "a replay must not rewrite");
    }

    #[test]
    fn unknown_user() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));
        let err = authenticate(&path, "mallory", CODES[0], 5, None).unwrap_err();
        assert!(matches!(err, OathError::UnknownUser));
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new().unwrap();
        let err =
            authenticate(dir.path().join("absent"), "alice", CODES[0], 5, None).unwrap_err();
        assert!(matches!(err, OathError::NoSuchFile(_)));
    }

    #[test]
    fn bad_secret_hex_is_fatal() {
        let dir = TempDir::new().unwrap();
        // A later valid line must not rescue the scan.
        let path = write_store(
            &dir,
            &format!("HOTP alice - 0xnothex\nHOTP alice - {}\n", SECRET_HEX),
        );
        let err = authenticate(&path, "alice", CODES[0], 5, None).unwrap_err();
        assert!(matches!(err, OathError::InvalidHex(_)));
    }

    // ── Password policy ──────────────────────────────────────────

    #[test]
    fn literal_password_must_match() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice hunter2 {}\n", SECRET_HEX));

        let err = authenticate(&path, "alice", CODES[0], 5, Some("wrong")).unwrap_err();
        assert!(matches!(err, OathError::BadPassword));
        authenticate(&path, "alice", CODES[0], 5, Some("hunter2")).unwrap();
    }

    #[test]
    fn dash_means_no_password() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));

        let err = authenticate(&path, "alice", CODES[0], 5, Some("surplus")).unwrap_err();
        assert!(matches!(err, OathError::BadPassword));
        authenticate(&path, "alice", CODES[0], 5, Some("")).unwrap();
    }

    #[test]
    fn plus_means_externally_verified() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice + {}\n", SECRET_HEX));
        authenticate(&path, "alice", CODES[0], 5, Some("anything")).unwrap();
    }

    #[test]
    fn none_password_skips_policy() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice hunter2 {}\n", SECRET_HEX));
        authenticate(&path, "alice", CODES[0], 5, None).unwrap();
    }

    // ── Multi-token accounts ─────────────────────────────────────

    #[test]
    fn each_token_line_authenticates_with_its_own_password() {
        let dir = TempDir::new().unwrap();
        let second_hex = codec::bin2hex(b"01234567890123456789");
        let path = write_store(
            &dir,
            &format!("HOTP alice pw1 {}\nHOTP alice pw2 {}\n", SECRET_HEX, second_hex),
        );
        let second_key = codec::hex_decode(&second_hex).unwrap();
        let second_code =
            core::generate(&second_key, 0, 6, crate::otp::types::Algorithm::Sha1).unwrap();

        authenticate(&path, "alice", CODES[0], 5, Some("pw1")).unwrap();
        authenticate(&path, "alice", &second_code, 5, Some("pw2")).unwrap();
    }

    #[test]
    fn bad_password_wins_over_invalid_otp() {
        let dir = TempDir::new().unwrap();
        let second_hex = codec::bin2hex(b"01234567890123456789");
        let path = write_store(
            &dir,
            &format!("HOTP alice pw1 {}\nHOTP alice pw2 {}\n", SECRET_HEX, second_hex),
        );
        let second_key = codec::hex_decode(&second_hex).unwrap();
        let second_code =
            core::generate(&second_key, 0, 6, crate::otp::types::Algorithm::Sha1).unwrap();

        // Line 2's OTP with line 1's password: line 1 fails the OTP
        // search, line 2 fails the password rule.
        let err = authenticate(&path, "alice", &second_code, 5, Some("pw1")).unwrap_err();
        assert!(matches!(err, OathError::BadPassword));
    }

    // ── TOTP authentication ──────────────────────────────────────

    #[test]
    fn totp_accepts_and_stores_absolute_step() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP/T30 alice - {}\n", SECRET_HEX));

        // At T=59 the current step is 1 and the 6-digit code is CODES[1].
        authenticate_at(&path, "alice", CODES[1], 0, None, 59).unwrap();
        let contents = read_store(&path);
        assert_eq!(contents.split('\t').nth(4), Some("1"));
    }

    #[test]
    fn totp_rejects_stale_step_as_replay() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP/T30 alice - {}\n", SECRET_HEX));

        authenticate_at(&path, "alice", CODES[2], 1, None, 60).unwrap();

        // A different literal OTP from an earlier step within the window
        // is chronologically stale.
        let err = authenticate_at(&path, "alice", CODES[1], 1, None, 60).unwrap_err();
        assert!(matches!(err, OathError::ReplayedOtp { .. }));

        // The step after the accepted one still works.
        authenticate_at(&path, "alice", CODES[3], 1, None, 90).unwrap();
    }

    #[test]
    fn totp_ignores_stored_counter_for_the_search() {
        let dir = TempDir::new().unwrap();
        // Stored counter 1 does not anchor the search; the clock does.
        let path = write_store(
            &dir,
            &format!("HOTP/T30 alice - {} 1 {} 2026-01-01T00:00:00L\n", SECRET_HEX, CODES[1]),
        );
        authenticate_at(&path, "alice", CODES[4], 0, None, 4 * 30 + 5).unwrap();
        let contents = read_store(&path);
        assert_eq!(contents.split('\t').nth(4), Some("4"));
    }

    // ── Rewrite fidelity ─────────────────────────────────────────

    #[test]
    fn rewrite_preserves_every_other_line_verbatim() {
        let dir = TempDir::new().unwrap();
        let contents = format!(
            "# provisioned 2026-02-01\n\
             HOTP bob pw {hex}  7\n\
             not a record at all\n\
             HOTP alice - {hex}\n\
             HOTP/T30 carol + {hex}\n",
            hex = SECRET_HEX
        );
        let path = write_store(&dir, &contents);

        authenticate(&path, "alice", CODES[0], 5, None).unwrap();

        let after = read_store(&path);
        let lines: Vec<&str> = after.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "# provisioned 2026-02-01");
        assert_eq!(lines[1], format!("HOTP bob pw {}  7", SECRET_HEX));
        assert_eq!(lines[2], "not a record at all");
        assert!(lines[3].starts_with(&format!("HOTP\talice\t-\t{}\t0\t{}", SECRET_HEX, CODES[0])));
        assert_eq!(lines[4], format!("HOTP/T30 carol + {}", SECRET_HEX));
    }

    #[test]
    fn rewrite_without_trailing_newline_stays_without() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}", SECRET_HEX));
        authenticate(&path, "alice", CODES[0], 5, None).unwrap();
        assert!(!read_store(&path).ends_with('\n'));
    }

    // ── Atomicity under induced failure ──────────────────────────

    #[test]
    fn unwritable_new_file_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_store(&dir, &format!("HOTP alice - {}\n", SECRET_HEX));
        let before = read_store(&path);

        // Occupy the scratch path with a directory so the create fails.
        fs::create_dir(sibling_path(&path, ".new")).unwrap();

        let err = authenticate(&path, "alice", CODES[0], 5, None).unwrap_err();
        assert!(matches!(err, OathError::WriteFile { .. }));
        assert_eq!(read_store(&path), before);
        assert!(!sibling_path(&path, ".lock").exists());
    }

    #[test]
    fn failed_rename_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let input_path = write_store(&dir, "one line\n");
        let mut input = File::open(&input_path).unwrap();

        // A directory at the target makes the rename itself fail.
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();

        let err = rewrite_through(&target, &mut input, 0, "replacement").unwrap_err();
        assert!(matches!(err, OathError::RenameFile { .. }));
        assert!(!sibling_path(&target, ".new").exists());
        assert_eq!(read_store(&input_path), "one line\n");
    }

    // ── Lock file lifecycle ──────────────────────────────────────

    #[test]
    fn lock_guard_unlinks_on_release_and_drop() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("users.otp.lock");

        let guard = LockGuard::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
        guard.release().unwrap();
        assert!(!lock_path.exists());

        let guard = LockGuard::acquire(&lock_path).unwrap();
        drop(guard);
        assert!(!lock_path.exists());
    }
}

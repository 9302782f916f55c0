//! Single-user access control for the pserver.
//!
//! # Storage layout
//!
//! ```text
//! <repository>/CVSROOT/
//!   passwd    user:crypt-hash:system-user
//!   readers   user
//!   writers   user
//! ```
//!
//! Every write replaces the whole file. The three files are written one
//! after another; a failure part way through leaves the earlier files
//! already replaced.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::unistd::{Uid, User};
use rand::Rng;

use crate::error::{credential_io, CredentialError};
use crate::paths::{passwd_path, readers_path, writers_path};
use crate::types::{Password, Username};

/// Length of a traditional `crypt(3)` salt.
pub const SALT_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// One-way password hash in the form the pserver verifies.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str, salt: &str) -> Result<String, CredentialError>;
}

/// Traditional DES-based `crypt(3)`, the format CVS checks `passwd` against.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixCrypt;

impl PasswordHasher for UnixCrypt {
    fn hash(&self, password: &str, salt: &str) -> Result<String, CredentialError> {
        pwhash::unix_crypt::hash_with(salt, password)
            .map_err(|err| CredentialError::Hash(err.to_string()))
    }
}

pub fn is_salt_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '.' || ch == '/'
}

/// Draw a fresh salt from the thread-local RNG.
pub fn random_salt() -> String {
    random_salt_with(&mut rand::thread_rng())
}

/// Draw 7-bit values until [`SALT_LEN`] of them land in `[A-Za-z0-9./]`.
pub fn random_salt_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut salt = String::with_capacity(SALT_LEN);
    while salt.len() < SALT_LEN {
        let candidate = char::from(rng.gen_range(0u8..128));
        if is_salt_char(candidate) {
            salt.push(candidate);
        }
    }
    salt
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One parsed line of `CVSROOT/passwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub username: String,
    pub hash: String,
    pub system_user: Option<String>,
}

impl PasswdEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, ':');
        let username = fields.next()?.to_owned();
        let hash = fields.next()?.to_owned();
        let system_user = fields.next().map(str::to_owned);
        Some(Self {
            username,
            hash,
            system_user,
        })
    }
}

/// Reads and replaces the credential files of one repository.
#[derive(Debug, Clone)]
pub struct CredentialStore<H = UnixCrypt> {
    repository: PathBuf,
    hasher: H,
}

impl CredentialStore<UnixCrypt> {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self::with_hasher(repository, UnixCrypt)
    }
}

impl<H: PasswordHasher> CredentialStore<H> {
    pub fn with_hasher(repository: impl Into<PathBuf>, hasher: H) -> Self {
        Self {
            repository: repository.into(),
            hasher,
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    /// Make `username` the only user, authorized for both reading and
    /// writing, with `password` hashed under a fresh salt.
    pub fn write(&self, username: &Username, password: &Password) -> Result<(), CredentialError> {
        let hash = self.hasher.hash(password.expose(), &random_salt())?;
        let owner = process_owner();

        replace_file(
            &passwd_path(&self.repository),
            &format!("{username}:{hash}:{owner}\n"),
        )?;
        replace_file(&readers_path(&self.repository), &format!("{username}\n"))?;
        replace_file(&writers_path(&self.repository), &format!("{username}\n"))?;

        tracing::info!(
            user = %username,
            repository = %self.repository.display(),
            "pserver credentials replaced",
        );
        Ok(())
    }

    /// Entries of `CVSROOT/passwd`; empty if the file does not exist yet.
    pub fn read_passwd(&self) -> Result<Vec<PasswdEntry>, CredentialError> {
        Ok(read_lines(&passwd_path(&self.repository))?
            .iter()
            .filter_map(|line| PasswdEntry::parse(line))
            .collect())
    }

    pub fn read_readers(&self) -> Result<Vec<String>, CredentialError> {
        read_lines(&readers_path(&self.repository))
    }

    pub fn read_writers(&self) -> Result<Vec<String>, CredentialError> {
        read_lines(&writers_path(&self.repository))
    }
}

/// Login name of the user this process runs as; the numeric uid when the
/// account has no passwd entry.
pub fn process_owner() -> String {
    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn replace_file(path: &Path, contents: &str) -> Result<(), CredentialError> {
    fs::write(path, contents).map_err(|e| credential_io(path, e))
}

fn read_lines(path: &Path) -> Result<Vec<String>, CredentialError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(credential_io(path, err)),
    };
    Ok(contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    /// Deterministic hasher so tests can assert on the exact line.
    struct Reversed;

    impl PasswordHasher for Reversed {
        fn hash(&self, password: &str, salt: &str) -> Result<String, CredentialError> {
            Ok(format!("{salt}{}", password.chars().rev().collect::<String>()))
        }
    }

    fn repo_with_cvsroot() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("CVSROOT")).expect("mkdir CVSROOT");
        dir
    }

    #[test]
    fn seeded_salt_is_reproducible_and_in_alphabet() {
        let a = random_salt_with(&mut StdRng::seed_from_u64(7));
        let b = random_salt_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), SALT_LEN);
        assert!(a.chars().all(is_salt_char), "salt was {a:?}");
    }

    #[test]
    fn salt_alphabet_is_crypt_alphabet() {
        let accepted: String = (0u8..128).map(char::from).filter(|c| is_salt_char(*c)).collect();
        assert_eq!(accepted.len(), 64);
        assert!(accepted.starts_with("./0123456789"));
    }

    #[test]
    fn random_salts_stay_in_alphabet() {
        for _ in 0..200 {
            let salt = random_salt();
            assert_eq!(salt.len(), SALT_LEN);
            assert!(salt.chars().all(is_salt_char), "salt was {salt:?}");
        }
    }

    #[test]
    fn unix_crypt_output_starts_with_salt() {
        let hash = UnixCrypt.hash("secret", "ab").expect("hash");
        assert!(hash.starts_with("ab"));
        assert!(pwhash::unix_crypt::verify("secret", &hash));
    }

    #[test]
    fn write_produces_single_line_files() {
        let repo = repo_with_cvsroot();
        let store = CredentialStore::with_hasher(repo.path(), Reversed);
        let user = Username::parse("alice").unwrap();
        store
            .write(&user, &Password::parse("abc").unwrap())
            .expect("write");

        let passwd = fs::read_to_string(passwd_path(repo.path())).unwrap();
        let line = passwd.strip_suffix('\n').expect("trailing newline");
        assert!(!line.contains('\n'));
        let entry = PasswdEntry::parse(line).expect("entry");
        assert_eq!(entry.username, "alice");
        assert!(entry.hash.ends_with("cba"));
        assert_eq!(entry.system_user.as_deref(), Some(process_owner().as_str()));

        assert_eq!(fs::read_to_string(readers_path(repo.path())).unwrap(), "alice\n");
        assert_eq!(fs::read_to_string(writers_path(repo.path())).unwrap(), "alice\n");
    }

    #[test]
    fn write_replaces_previous_user() {
        let repo = repo_with_cvsroot();
        let store = CredentialStore::new(repo.path());
        store
            .write(&Username::parse("first").unwrap(), &Password::parse("one").unwrap())
            .expect("first write");
        store
            .write(&Username::parse("second").unwrap(), &Password::parse("two").unwrap())
            .expect("second write");

        let entries = store.read_passwd().expect("read passwd");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "second");
        assert!(pwhash::unix_crypt::verify("two", &entries[0].hash));
        assert_eq!(store.read_readers().unwrap(), vec!["second".to_string()]);
        assert_eq!(store.read_writers().unwrap(), vec!["second".to_string()]);
    }

    #[test]
    fn write_fails_without_cvsroot() {
        let dir = TempDir::new().expect("tempdir");
        let store = CredentialStore::new(dir.path());
        let err = store
            .write(&Username::default_identity(), &Password::default_identity())
            .unwrap_err();
        match err {
            CredentialError::Io { path, .. } => assert!(path.ends_with("CVSROOT/passwd")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reads_are_empty_before_first_write() {
        let repo = repo_with_cvsroot();
        let store = CredentialStore::new(repo.path());
        assert!(store.read_passwd().unwrap().is_empty());
        assert!(store.read_readers().unwrap().is_empty());
    }
}

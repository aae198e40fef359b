//! Credential file reader and Argon2 password checks.
//!
//! The credential file is a small `KEY=VALUE` file. Its presence alone turns
//! authentication on; `APP_USER`/`APP_PASSWORD` name the operator account and
//! `MASTER_USER`/`MASTER_PASSWORD` an optional second one. Passwords are
//! Argon2 PHC strings produced by [`hash_password`].

use std::io::ErrorKind;
use std::path::Path;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub app_user: Option<String>,
    pub app_password: Option<String>,
    pub master_user: Option<String>,
    pub master_password: Option<String>,
}

/// The credential file exists but lacks the operator account.
#[derive(Debug, thiserror::Error)]
#[error("Server is not configured correctly. APP_USER or APP_PASSWORD missing.")]
pub struct NotConfigured;

impl Credentials {
    /// Loads the credential file; `None` when it does not exist.
    pub fn load(path: &Path) -> std::io::Result<Option<Credentials>> {
        match std::fs::read_to_string(path) {
            Ok(source) => Ok(Some(Credentials::parse(&source))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn parse(source: &str) -> Credentials {
        let mut credentials = Credentials::default();
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value
                .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '\0')
                .to_string();
            let slot = match key.trim() {
                "APP_USER" => &mut credentials.app_user,
                "APP_PASSWORD" => &mut credentials.app_password,
                "MASTER_USER" => &mut credentials.master_user,
                "MASTER_PASSWORD" => &mut credentials.master_password,
                _ => continue,
            };
            *slot = Some(value).filter(|v| !v.is_empty());
        }
        credentials
    }

    /// Checks a login against the operator account, then the master account.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, NotConfigured> {
        let (Some(app_user), Some(app_hash)) = (&self.app_user, &self.app_password) else {
            return Err(NotConfigured);
        };
        if username == app_user && verify_password(password, app_hash) {
            return Ok(true);
        }
        if let (Some(master_user), Some(master_hash)) = (&self.master_user, &self.master_password)
        {
            if username == master_user && verify_password(password, master_hash) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Hashes a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Whether `password` matches `hash`. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!("unparsable password hash in credential file: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_lines() {
        let creds = Credentials::parse(
            "# operator\nAPP_USER = admin\nAPP_PASSWORD=\"$argon2id$v=19$x\"\n\nMASTER_USER='root'\nnoise\nOTHER=1\n",
        );
        assert_eq!(creds.app_user.as_deref(), Some("admin"));
        assert_eq!(creds.app_password.as_deref(), Some("$argon2id$v=19$x"));
        assert_eq!(creds.master_user.as_deref(), Some("root"));
        assert_eq!(creds.master_password, None);
    }

    #[test]
    fn verifies_app_and_master_accounts() {
        let creds = Credentials {
            app_user: Some("admin".into()),
            app_password: Some(hash_password("pass123").unwrap()),
            master_user: Some("root".into()),
            master_password: Some(hash_password("master").unwrap()),
        };
        assert!(creds.verify("admin", "pass123").unwrap());
        assert!(creds.verify("root", "master").unwrap());
        assert!(!creds.verify("admin", "master").unwrap());
        assert!(!creds.verify("nobody", "pass123").unwrap());
    }

    #[test]
    fn missing_operator_account_is_not_configured() {
        let creds = Credentials::parse("MASTER_USER=root\n");
        assert!(creds.verify("root", "x").is_err());
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify_password("x", "not-a-hash"));
    }

    #[test]
    fn absent_file_disables_auth() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Credentials::load(&dir.path().join(".env")).unwrap(), None);
    }
}

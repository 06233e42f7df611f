//! Shared utility functions for provider adapters.

use va_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Other(e.to_string())
    }
}

/// Read an API key/credential out of the named environment variable.
///
/// Every provider config in this gateway names credentials by env var
/// (`api_key_env`, `key_env`, ...) rather than a structured auth config —
/// there is exactly one deployment-time secret per provider, so a keychain
/// or multi-profile resolver would be unused machinery.
pub fn resolve_env_credential(env_var: &str) -> Result<String> {
    std::env::var(env_var)
        .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_credential_reads_the_var() {
        std::env::set_var("VA_TEST_CRED_1", "secret-value");
        assert_eq!(resolve_env_credential("VA_TEST_CRED_1").unwrap(), "secret-value");
        std::env::remove_var("VA_TEST_CRED_1");
    }

    #[test]
    fn resolve_env_credential_missing_is_an_auth_error() {
        let err = resolve_env_credential("VA_TEST_CRED_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}

use anyhow::anyhow;
use std::{fmt, panic::Location};

pub mod client;
pub mod conf;
pub mod consts;
pub mod cryptography {
    pub mod backend;
    pub mod signatures;
    #[cfg(feature = "tfhe-packer")]
    pub mod tfhe_packer;
}
pub mod eip712;
pub(crate) mod engine {
    pub(crate) mod validation;
}
pub mod error;
pub mod input {
    pub mod builder;
    pub mod codec;
    pub mod handles;
    pub mod proof;
}
pub mod instance;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use client::threshold::{
    DecryptionSession, SessionState, SignerResponse, SignerSet, ThresholdDecryptClient,
    ThresholdResult,
};
pub use error::{Error, Rejection, Result, ValidationError};
pub use input::builder::{EncryptedInput, InputBuilder};
pub use input::codec::{ClearValue, FheKind, TypedValue};
pub use instance::{Capabilities, RelayerInstance};
pub use relayer_wire::Handle;

/// Truncate s to a maximum of 128 chars.
pub(crate) fn top_n_chars(mut s: String) -> String {
    s.truncate(128);
    s
}

/// Helper method for returning the optional value of `input` if it exists, otherwise
/// returning a custom anyhow error.
pub fn some_or_err<T>(input: Option<T>, error: String) -> anyhow::Result<T> {
    input.ok_or_else(|| {
        tracing::warn!(error);
        anyhow!("Missing value: {}", top_n_chars(error.to_string()))
    })
}

#[track_caller]
pub(crate) fn anyhow_error_and_log<S: AsRef<str> + fmt::Display>(msg: S) -> anyhow::Error {
    tracing::error!("Error in {}: {}", Location::caller(), msg);
    anyhow!("Error in {}: {}", Location::caller(), msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tracing_test::traced_test]
    #[test]
    fn missing_value_is_logged() {
        let err = some_or_err::<u8>(None, "no signer answered".to_string()).unwrap_err();
        assert!(err.to_string().contains("Missing value: no signer answered"));
        assert!(logs_contain("no signer answered"));
        assert_eq!(some_or_err(Some(3), "unused".to_string()).unwrap(), 3);
    }

    #[tracing_test::traced_test]
    #[test]
    fn errors_carry_their_location() {
        let err = anyhow_error_and_log("bad share");
        assert!(err.to_string().contains("lib.rs"));
        assert!(logs_contain("bad share"));
    }

    #[test]
    fn truncation() {
        assert_eq!(top_n_chars("a".repeat(200)).len(), 128);
        assert_eq!(top_n_chars("abc".to_string()), "abc");
    }
}

//! # ModNet Privacy Crate
//!
//! Data subject rights for ModNet accounts: a machine-readable export of
//! everything stored about a user, and account erasure that removes the
//! user's data from every table and the attachment store.

pub mod erasure;
pub mod export;

use thiserror::Error;

pub use erasure::{erase_account, ErasureReport, ErasureStep};
pub use export::{export_user_data, UserExport};

pub type PrivacyResult<T> = Result<T, PrivacyError>;

#[derive(Debug, Error)]
pub enum PrivacyError {
    #[error("user not found")]
    UserNotFound,

    #[error("confirmation email does not match the account")]
    ConfirmationMismatch,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Check that `confirm_email` names the account about to be erased.
pub fn confirm_erasure(account_email: &str, confirm_email: &str) -> PrivacyResult<()> {
    if account_email.eq_ignore_ascii_case(confirm_email.trim()) {
        Ok(())
    } else {
        Err(PrivacyError::ConfirmationMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_ignores_case_and_padding() {
        assert!(confirm_erasure("ada@uni-example.de", " Ada@Uni-Example.de ").is_ok());
        assert!(matches!(
            confirm_erasure("ada@uni-example.de", "eve@uni-example.de"),
            Err(PrivacyError::ConfirmationMismatch)
        ));
    }
}

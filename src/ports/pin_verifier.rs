use crate::error::SignerResult;
use crate::model::{Pin, TokenStatus};

/// Login capability of a token
pub trait PinVerifier {
    /// Set the user PIN of a token that has none yet
    fn initialize(&mut self, pin: &Pin) -> SignerResult<()>;

    /// Log in; `Ok(false)` means the PIN was wrong
    fn unlock(&mut self, pin: &Pin) -> SignerResult<bool>;

    fn lock(&mut self) -> SignerResult<()>;

    fn is_unlocked(&self) -> bool;

    /// Status as the module reports it right now
    fn status(&self) -> TokenStatus;
}

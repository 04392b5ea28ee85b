use crate::error::SignerResult;
use crate::model::Token;

/// Durable home of the registry snapshot
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> SignerResult<Vec<Token>>;

    /// Full rewrite with the tokens worth keeping
    fn save(&self, tokens: &[Token]) -> SignerResult<()>;

    /// True when someone else changed the snapshot since the last load or save
    fn has_changed(&self) -> bool {
        false
    }
}

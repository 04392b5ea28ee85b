use super::TokenModule;
use crate::error::SignerResult;
use crate::model::TokenDescriptor;

/// Enumerates the slots of one kind of security module
pub trait ModuleFinder: Send + Sync {
    /// Module type of every descriptor this finder reports
    fn module_type(&self) -> &str;

    fn list_available_slots(&self) -> SignerResult<Vec<TokenDescriptor>>;

    /// Open a module instance for a slot reported by this finder
    fn open(&self, descriptor: &TokenDescriptor) -> SignerResult<Box<dyn TokenModule>>;
}

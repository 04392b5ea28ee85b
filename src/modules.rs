//! Ownership of module instances: one per token, each behind its own lock
//!
//! The registry never touches a module. Use cases look up the module for a
//! token here and call it after releasing the registry lock, so a slow
//! device only blocks callers of that same token.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ModuleError, SignerResult};
use crate::model::TokenDescriptor;
use crate::ports::{ModuleFinder, TokenModule};

pub type SharedModule = Arc<Mutex<Box<dyn TokenModule>>>;

pub struct ModuleManager {
    finders: Vec<Arc<dyn ModuleFinder>>,
    modules: RwLock<HashMap<String, SharedModule>>,
}

impl ModuleManager {
    pub fn new(finders: Vec<Arc<dyn ModuleFinder>>) -> Self {
        Self {
            finders,
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Enumerate every finder, open modules for new tokens and drop vanished ones
    ///
    /// A failing finder is logged and contributes no tokens.
    pub fn discover(&self) -> Vec<TokenDescriptor> {
        let mut descriptors: Vec<TokenDescriptor> = Vec::new();
        for finder in &self.finders {
            match finder.list_available_slots() {
                Ok(found) => {
                    for descriptor in found {
                        if descriptors.iter().any(|d| d.id == descriptor.id) {
                            warn!(
                                "Ignoring {} token '{}', the id is already taken",
                                finder.module_type(),
                                descriptor.id
                            );
                            continue;
                        }
                        descriptors.push(descriptor);
                    }
                }
                Err(e) => warn!("Listing {} slots failed: {e}", finder.module_type()),
            }
        }

        let mut modules = self.modules.write();
        modules.retain(|token_id, _| {
            let present = descriptors.iter().any(|d| &d.id == token_id);
            if !present {
                info!("Module for token '{token_id}' is gone");
            }
            present
        });

        for descriptor in &descriptors {
            if modules.contains_key(&descriptor.id) {
                continue;
            }
            let Some(finder) = self
                .finders
                .iter()
                .find(|f| f.module_type() == descriptor.module_type)
            else {
                continue;
            };
            match finder.open(descriptor) {
                Ok(module) => {
                    debug!("Opened module for token '{}'", descriptor.id);
                    modules.insert(descriptor.id.clone(), Arc::new(Mutex::new(module)));
                }
                Err(e) => warn!("Opening module for token '{}' failed: {e}", descriptor.id),
            }
        }

        descriptors
    }

    pub fn module(&self, token_id: &str) -> SignerResult<SharedModule> {
        self.modules
            .read()
            .get(token_id)
            .cloned()
            .ok_or_else(|| {
                ModuleError::Unavailable {
                    token_id: token_id.to_string(),
                }
                .into()
            })
    }

    /// Run `f` with exclusive access to the module of `token_id`
    pub fn with_module<R>(
        &self,
        token_id: &str,
        f: impl FnOnce(&mut dyn TokenModule) -> SignerResult<R>,
    ) -> SignerResult<R> {
        let module = self.module(token_id)?;
        let mut guard = module.lock();
        f(&mut **guard)
    }

    pub fn has_module(&self, token_id: &str) -> bool {
        self.modules.read().contains_key(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake_module::FakeModuleFinder;
    use crate::error::ErrorKind;

    #[test]
    fn test_discover_opens_and_drops_modules() {
        let finder = FakeModuleFinder::new();
        finder.plug("T1");
        finder.plug("T2");
        let manager = ModuleManager::new(vec![Arc::new(finder.clone())]);

        let descriptors = manager.discover();
        assert_eq!(descriptors.len(), 2);
        assert!(manager.has_module("T1"));

        finder.unplug("T1");
        manager.discover();
        assert!(!manager.has_module("T1"));
        assert!(manager.has_module("T2"));
    }

    #[test]
    fn test_missing_module_is_unavailable() {
        let manager = ModuleManager::new(Vec::new());
        let err = manager.with_module("T1", |m| Ok(m.is_unlocked())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleUnavailable);
    }

    #[test]
    fn test_duplicate_token_ids_keep_first() {
        let first = FakeModuleFinder::new();
        first.plug("T1");
        let second = FakeModuleFinder::new();
        second.plug("T1");
        let manager = ModuleManager::new(vec![Arc::new(first), Arc::new(second)]);

        assert_eq!(manager.discover().len(), 1);
    }
}

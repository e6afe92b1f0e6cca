//! Trawl Modules - site modules shipped with the framework.
//!
//! - [`fakebank`] - Reference banking module over a JSON API

pub mod fakebank;

use std::sync::Arc;
use trawl_backend::{BackendRegistry, Module};

/// Every bundled module.
pub fn all() -> Vec<Arc<dyn Module>> {
    vec![fakebank::module()]
}

/// Register every bundled module in `registry`.
pub fn register_all(registry: &BackendRegistry) {
    for module in all() {
        registry.register_module(module);
    }
}

mod config_tests;
mod discovery_tests;
mod observe_tests;
mod oracle_tests;
mod retry_tests;
mod selector_tests;
mod wait_tests;

use crate::platforms::memory::MemoryPage;
use crate::Page;
use std::sync::Arc;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory page and the `Page` wrapping it.
pub fn memory_page(url: &str) -> (MemoryPage, Page) {
    let memory = MemoryPage::new(url);
    let page = Page::new(Arc::new(memory.clone()));
    (memory, page)
}

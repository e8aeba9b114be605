//! Hearth application shell.
//!
//! Startup order: find the mount element, hand it to the UI runtime, then
//! let the service worker manager decide whether and how to register the
//! caching worker. Caching setup never blocks or breaks the mount.

pub mod boot;
pub mod page;
pub mod runtime;

pub use boot::{boot, worker_target, BootReport};
pub use page::{simulated_page, PageScenario};
pub use runtime::{ConsoleRuntime, Document, Element, MountOptions, UiRuntime};

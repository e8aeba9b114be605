//! The UI runtime seam and the page document it mounts into.

use std::cell::RefCell;

use serde::Serialize;
use tracing::info;

/// A DOM element, reduced to what mounting needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    pub id: String,
}

impl Element {
    pub fn new(tag: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: id.into(),
        }
    }
}

/// The elements of the host page that carry an id.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual single-page shell: one empty `<div>` to mount into.
    pub fn app_shell(mount_id: &str) -> Self {
        Self::new().with_element(Element::new("div", mount_id))
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// Options handed to [`UiRuntime::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountOptions {
    /// Mount point. `None` lets the runtime take over the document body.
    pub node: Option<Element>,
}

/// A prebuilt UI runtime that takes over a DOM node.
pub trait UiRuntime {
    /// Mount the application. Fire-and-forget.
    fn init(&self, options: MountOptions);
}

/// Runtime that only logs the mount; stands in for the real UI bundle.
#[derive(Debug, Default)]
pub struct ConsoleRuntime {
    mounts: RefCell<Vec<MountOptions>>,
}

impl ConsoleRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mount performed so far.
    pub fn mounts(&self) -> Vec<MountOptions> {
        self.mounts.borrow().clone()
    }
}

impl UiRuntime for ConsoleRuntime {
    fn init(&self, options: MountOptions) {
        match &options.node {
            Some(node) => info!(tag = %node.tag, id = %node.id, "Application mounted"),
            None => info!("Application mounted on document body"),
        }
        self.mounts.borrow_mut().push(options);
    }
}

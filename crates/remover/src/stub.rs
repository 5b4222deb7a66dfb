//! Deterministic remover for tests and dry runs.
//!
//! Never touches a model or spawns a process. The call counter lets callers
//! assert that a rejected request never reached the adapter.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;

use crate::{RemoveError, Remover};

/// What the stub does with each image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubBehavior {
    /// Return the input converted to RGBA, alpha untouched.
    Identity,
    /// Fail every call with this message.
    Fail(String),
    /// Fail only images of exactly this width; pass the rest through.
    FailOnWidth(u32),
}

#[derive(Debug)]
pub struct StubRemover {
    behavior: StubBehavior,
    calls: AtomicUsize,
}

impl StubRemover {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn identity() -> Self {
        Self::new(StubBehavior::Identity)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(StubBehavior::Fail(message.into()))
    }

    /// How many times `remove` has been invoked, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubRemover {
    fn default() -> Self {
        Self::identity()
    }
}

impl Remover for StubRemover {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage, RemoveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Identity => Ok(DynamicImage::ImageRgba8(image.to_rgba8())),
            StubBehavior::Fail(message) => Err(RemoveError::Command(message.clone())),
            StubBehavior::FailOnWidth(width) if image.width() == *width => Err(
                RemoveError::UnsupportedImage(format!("stub refuses width {width}")),
            ),
            StubBehavior::FailOnWidth(_) => Ok(DynamicImage::ImageRgba8(image.to_rgba8())),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

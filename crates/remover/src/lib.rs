//! Background removal adapters for bgrelay.
//!
//! A [`Remover`] takes a decoded image and gives back a same-sized image whose
//! background is transparent. Callers encode the result as PNG themselves so
//! alpha always survives.
//!
//! Three backends ship here:
//!
//! - **command** - pipe a PNG through an external program (`rembg i - -` by
//!   default). This is what production deployments run.
//! - **onnx** - run a U²-Net model in-process. Only with the `onnx` feature.
//! - **identity** - the deterministic [`StubRemover`]. No model, no process.
//!
//! Removers are blocking and CPU-bound. Async callers should run them on a
//! blocking pool and bound how many run at once.
//!
//! ```
//! use image::{DynamicImage, RgbImage};
//! use remover::{RemoverBackend, RemoverConfig};
//!
//! let cfg = RemoverConfig {
//!     backend: RemoverBackend::Identity,
//!     ..Default::default()
//! };
//! let remover = cfg.build().unwrap();
//! let out = remover
//!     .remove(&DynamicImage::ImageRgb8(RgbImage::new(8, 8)))
//!     .unwrap();
//! assert_eq!((out.width(), out.height()), (8, 8));
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

mod command;
mod error;
pub mod mask;
#[cfg(feature = "onnx")]
mod onnx;
pub mod stub;

pub use command::CommandRemover;
pub use error::RemoveError;
#[cfg(feature = "onnx")]
pub use onnx::OnnxRemover;
pub use stub::{StubBehavior, StubRemover};

/// Something that can cut the background out of an image.
pub trait Remover: Send + Sync {
    /// Returns an image with the same dimensions as `image` and the
    /// background made transparent.
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage, RemoveError>;

    /// Short backend name for logs and metrics labels.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoverBackend {
    #[default]
    Command,
    Onnx,
    Identity,
}

/// Remover selection and backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoverConfig {
    pub backend: RemoverBackend,
    /// Program for the `command` backend.
    pub program: String,
    /// Arguments for the `command` backend.
    pub args: Vec<String>,
    /// Model file for the `onnx` backend.
    pub model_path: Option<PathBuf>,
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            backend: RemoverBackend::Command,
            program: "rembg".into(),
            args: vec!["i".into(), "-".into(), "-".into()],
            model_path: None,
        }
    }
}

impl RemoverConfig {
    pub fn validate(&self) -> Result<(), RemoveError> {
        match self.backend {
            RemoverBackend::Command if self.program.trim().is_empty() => Err(
                RemoveError::InvalidConfig("command backend needs a program".into()),
            ),
            RemoverBackend::Onnx if self.model_path.is_none() => Err(RemoveError::InvalidConfig(
                "onnx backend needs model_path".into(),
            )),
            RemoverBackend::Onnx if !cfg!(feature = "onnx") => Err(RemoveError::InvalidConfig(
                "onnx backend requested but the `onnx` feature is not enabled".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Builds the configured remover.
    pub fn build(&self) -> Result<Arc<dyn Remover>, RemoveError> {
        self.validate()?;
        match self.backend {
            RemoverBackend::Command => Ok(Arc::new(CommandRemover::new(
                self.program.clone(),
                self.args.clone(),
            ))),
            RemoverBackend::Identity => Ok(Arc::new(StubRemover::identity())),
            RemoverBackend::Onnx => build_onnx(self),
        }
    }
}

#[cfg(feature = "onnx")]
fn build_onnx(cfg: &RemoverConfig) -> Result<Arc<dyn Remover>, RemoveError> {
    let path = cfg
        .model_path
        .clone()
        .ok_or_else(|| RemoveError::InvalidConfig("onnx backend needs model_path".into()))?;
    Ok(Arc::new(OnnxRemover::new(path)?))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_cfg: &RemoverConfig) -> Result<Arc<dyn Remover>, RemoveError> {
    Err(RemoveError::InvalidConfig(
        "onnx backend requested but the `onnx` feature is not enabled".into(),
    ))
}

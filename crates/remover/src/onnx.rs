//! In-process U²-Net inference through ONNX Runtime.
//!
//! Sessions are cached per worker thread and keyed by model path; the ORT
//! environment is process-global.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use once_cell::sync::OnceCell;
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::Array4;
use onnxruntime::session::Session;
use tracing::debug;

use crate::mask::{apply_mask, normalize_prediction};
use crate::{RemoveError, Remover};

/// Square input edge the U²-Net family expects.
const MODEL_SIDE: u32 = 320;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

thread_local! {
    static SESSIONS: RefCell<HashMap<PathBuf, Rc<RefCell<Session<'static>>>>> =
        RefCell::new(HashMap::new());
}

fn ort_environment() -> Result<&'static Environment, RemoveError> {
    ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("bgrelay-remover")
            .build()
            .map_err(|e| RemoveError::Inference(e.to_string()))
    })
}

fn session_for(model_path: &Path) -> Result<Rc<RefCell<Session<'static>>>, RemoveError> {
    SESSIONS.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(session) = cache.get(model_path) {
            return Ok(session.clone());
        }

        let session = ort_environment()?
            .new_session_builder()
            .map_err(|e| RemoveError::Inference(e.to_string()))?
            .with_model_from_file(model_path.to_path_buf())
            .map_err(|e| RemoveError::Inference(e.to_string()))?;
        let session = Rc::new(RefCell::new(session));
        cache.insert(model_path.to_path_buf(), session.clone());
        Ok(session)
    })
}

/// U²-Net style salient object segmentation.
#[derive(Debug, Clone)]
pub struct OnnxRemover {
    model_path: PathBuf,
}

impl OnnxRemover {
    /// Fails fast when the model file is missing so misconfiguration shows up
    /// at startup rather than on the first request.
    pub fn new(model_path: impl Into<PathBuf>) -> Result<Self, RemoveError> {
        let model_path = model_path.into();
        if !model_path.is_file() {
            return Err(RemoveError::ModelNotFound(model_path.display().to_string()));
        }
        Ok(Self { model_path })
    }
}

fn to_tensor(image: &DynamicImage) -> Array4<f32> {
    let resized = image
        .resize_exact(MODEL_SIDE, MODEL_SIDE, FilterType::Lanczos3)
        .to_rgb8();
    let peak = resized.as_raw().iter().copied().max().unwrap_or(0).max(1) as f32;

    let side = MODEL_SIDE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let v = f32::from(pixel[c]) / peak;
            tensor[[0, c, y as usize, x as usize]] = (v - MEAN[c]) / STD[c];
        }
    }
    tensor
}

impl Remover for OnnxRemover {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage, RemoveError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(RemoveError::UnsupportedImage("zero-sized image".into()));
        }
        let start = Instant::now();

        let input = to_tensor(image);
        let session = session_for(&self.model_path)?;
        let prediction: Vec<f32> = {
            let mut guard = session.borrow_mut();
            let outputs = guard
                .run::<f32, f32, _>(vec![input])
                .map_err(|e| RemoveError::Inference(e.to_string()))?;
            let first = outputs
                .into_iter()
                .next()
                .ok_or_else(|| RemoveError::Inference("model returned no outputs".into()))?;
            first.iter().copied().collect()
        };

        let expected = (MODEL_SIDE * MODEL_SIDE) as usize;
        if prediction.len() != expected {
            return Err(RemoveError::Inference(format!(
                "expected {expected} mask values, got {}",
                prediction.len()
            )));
        }

        let small = GrayImage::from_raw(MODEL_SIDE, MODEL_SIDE, normalize_prediction(&prediction))
            .ok_or_else(|| RemoveError::Inference("mask buffer has wrong length".into()))?;
        let mask = image::imageops::resize(&small, width, height, FilterType::Lanczos3);
        let cut = apply_mask(image, &mask)?;

        debug!(
            model = %self.model_path.display(),
            width,
            height,
            elapsed_ms = start.elapsed().as_millis(),
            "onnx_remover_done"
        );
        Ok(DynamicImage::ImageRgba8(cut))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

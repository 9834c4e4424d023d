//! ONNX image classifier exposed as a neural provider.
//!
//! The classifier turns the first inline image of a conversation into a
//! comma-separated list of its top-k labels, which the metadata generator
//! can consume as a keyword response. Checkpoints are ONNX graph files.

pub mod preprocess;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};

use super::neural::{NeuralBackend, NeuralNetworkProvider};
use super::GenerationOptions;
use crate::config::OnnxConfig;
use crate::error::ProviderError;
use crate::message::{ContentBlock, Message};
use preprocess::{preprocess, Normalization};

/// A loaded ONNX session plus the file it came from.
pub struct OnnxModel {
    session: Session,
    input_name: String,
    source: PathBuf,
}

/// Raw classifier scores and how many labels to keep.
pub struct Scores {
    values: Vec<f32>,
    top_k: usize,
}

/// Image classification over an ONNX graph with a plain-text label file.
pub struct OnnxClassifier {
    model_name: String,
    model_path: PathBuf,
    labels: Vec<String>,
    image_size: u32,
    top_k: usize,
    normalization: Normalization,
}

/// Neural provider backed by [`OnnxClassifier`].
pub type OnnxProvider = NeuralNetworkProvider<OnnxClassifier>;

impl OnnxClassifier {
    pub fn new(model_name: &str, model_path: PathBuf, labels: Vec<String>) -> Self {
        Self {
            model_name: model_name.to_string(),
            model_path,
            labels,
            image_size: 224,
            top_k: 10,
            normalization: Normalization::IMAGENET,
        }
    }

    /// Build from config. A missing labels file leaves labels empty (indices are reported).
    pub fn from_config(model_name: &str, config: &OnnxConfig) -> Self {
        let labels = config
            .resolved_labels_path()
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(text) => Some(parse_labels(&text)),
                Err(e) => {
                    tracing::warn!("Could not read labels {:?}: {e}", path);
                    None
                }
            })
            .unwrap_or_default();

        let mut classifier = Self::new(model_name, config.resolved_model_path(model_name), labels);
        classifier.image_size = config.image_size;
        classifier.top_k = config.top_k;
        if config.symmetric_normalization {
            classifier.normalization = Normalization::SYMMETRIC;
        }
        classifier
    }

    fn error(&self, message: String) -> ProviderError {
        ProviderError::Inference {
            model: self.model_name.clone(),
            message,
        }
    }

    fn open_session(&self, path: &Path) -> Result<OnnxModel, ProviderError> {
        let session = Session::builder()
            .map_err(|e| self.error(format!("Failed to create ONNX session builder: {e}")))?
            .commit_from_file(path)
            .map_err(|e| self.error(format!("Failed to load ONNX model {path:?}: {e}")))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!("Loaded ONNX classifier from {:?} (input: {input_name})", path);
        Ok(OnnxModel {
            session,
            input_name,
            source: path.to_path_buf(),
        })
    }

    fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{index}"))
    }
}

/// One label per line; blank lines and `#` comments are ignored.
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Indices of the `k` highest scores, best first.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.into_iter().take(k).map(|(i, _)| i).collect()
}

impl NeuralBackend for OnnxClassifier {
    type Model = OnnxModel;
    type Input = Array4<f32>;
    type Output = Scores;

    fn name(&self) -> &str {
        "onnx"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn build_model(&self) -> Result<OnnxModel, ProviderError> {
        self.open_session(&self.model_path)
    }

    fn load_checkpoint(&self, model: &mut OnnxModel, path: &Path) -> Result<(), ProviderError> {
        *model = self.open_session(path)?;
        Ok(())
    }

    fn save_checkpoint(&self, model: &OnnxModel, path: &Path) -> Result<(), ProviderError> {
        std::fs::copy(&model.source, path)?;
        Ok(())
    }

    fn preprocess_messages(&self, messages: &[Message]) -> Result<Array4<f32>, ProviderError> {
        let block = messages
            .iter()
            .flat_map(|m| m.content())
            .find(|b| matches!(b, ContentBlock::ImageBase64 { .. }))
            .ok_or_else(|| ProviderError::UnsupportedInput {
                provider: "onnx".to_string(),
                message: "an inline image is required".to_string(),
            })?;

        let bytes = block
            .decode_image()
            .transpose()
            .map_err(|e| self.error(format!("Invalid base64 image: {e}")))?
            .unwrap_or_default();
        let image = image::load_from_memory(&bytes)
            .map_err(|e| self.error(format!("Failed to decode image: {e}")))?;

        Ok(preprocess(&image, self.image_size, self.normalization))
    }

    fn forward_pass(
        &self,
        model: &mut OnnxModel,
        input: Array4<f32>,
        options: &GenerationOptions,
    ) -> Result<Scores, ProviderError> {
        // ort takes (shape, flat_data) so we avoid coupling to its ndarray version.
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = input.iter().copied().collect();
        let value = Value::from_array((shape, flat))
            .map_err(|e| self.error(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![model.input_name.as_str() => value];
        let outputs = model
            .session
            .run(inputs)
            .map_err(|e| self.error(format!("ONNX inference failed: {e}")))?;

        let (_, first) = outputs
            .iter()
            .next()
            .ok_or_else(|| self.error("Model produced no outputs".to_string()))?;
        let (_, data) = first
            .try_extract_tensor::<f32>()
            .map_err(|e| self.error(format!("Failed to extract scores: {e}")))?;

        Ok(Scores {
            values: data.to_vec(),
            top_k: options.top_k.map(|k| k as usize).unwrap_or(self.top_k),
        })
    }

    fn postprocess_output(&self, output: Scores) -> Result<String, ProviderError> {
        let labels: Vec<String> = top_k_indices(&output.values, output.top_k)
            .into_iter()
            .map(|i| self.label(i))
            .collect();
        Ok(labels.join(", "))
    }

    fn supports_images(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> OnnxClassifier {
        OnnxClassifier::new(
            "mobilenet",
            PathBuf::from("/nonexistent/model.onnx"),
            vec!["lake".into(), "forest".into(), "city".into()],
        )
    }

    #[test]
    fn test_parse_labels_skips_comments() {
        let labels = parse_labels("# imagenet subset\nlake\n\n forest \n");
        assert_eq!(labels, vec!["lake", "forest"]);
    }

    #[test]
    fn test_top_k_indices_orders_by_score() {
        assert_eq!(top_k_indices(&[0.1, 0.9, 0.5], 2), vec![1, 2]);
        assert_eq!(top_k_indices(&[0.1], 5), vec![0]);
    }

    #[test]
    fn test_postprocess_joins_labels() {
        let out = classifier()
            .postprocess_output(Scores {
                values: vec![0.2, 0.1, 0.7, 0.05],
                top_k: 4,
            })
            .unwrap();
        assert_eq!(out, "city, lake, forest, class_3");
    }

    #[test]
    fn test_preprocess_requires_inline_image() {
        let err = classifier()
            .preprocess_messages(&[Message::user("no image here")])
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedInput { .. }));
    }

    #[test]
    fn test_preprocess_decodes_png() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(8, 8))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let msg = Message::user_with_image("classify", ContentBlock::image_bytes(&png, "png"));
        let tensor = classifier().preprocess_messages(&[msg]).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let provider = OnnxProvider::new(classifier(), None);
        assert!(provider.load_model().is_err());
        assert!(!provider.is_loaded());
    }
}

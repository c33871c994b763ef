//! Code generation collaborator seam.
//!
//! The toolchain itself does not render templates; it hands a cleaned
//! contract model to a renderer and stages whatever source comes back.

use std::path::Path;

use serde_json::Value;

use crate::{
    error::{Result, ToolchainError},
    json::clean_model,
};

/// Renders contract source from a validated model. Implementations live
/// outside this crate (template engines, LLM backends); failures are
/// input-shape errors as far as the pipelines are concerned.
pub trait ContractRenderer {
    /// Produce contract source text for the given model.
    fn render(&self, model: &Value) -> Result<String>;

    /// Copy a project skeleton into `dest` for chains whose build tool
    /// needs a full project tree rather than a single file.
    fn scaffold(&self, template_dir: &Path, dest: &Path) -> Result<()>;
}

/// Clean a raw model and run it through the renderer, rejecting models
/// that clean away to nothing and renderers that produce empty output.
pub fn render_contract<R: ContractRenderer>(renderer: &R, model: Value) -> Result<String> {
    let model = clean_model(model).ok_or_else(|| {
        ToolchainError::Validation("contract model is empty after cleaning".to_string())
    })?;
    let source = renderer.render(&model)?;
    if source.trim().is_empty() {
        return Err(ToolchainError::Validation(
            "renderer produced empty contract source".to_string(),
        ));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoRenderer;

    impl ContractRenderer for EchoRenderer {
        fn render(&self, model: &Value) -> Result<String> {
            Ok(model["name"].as_str().unwrap_or_default().to_string())
        }

        fn scaffold(&self, _template_dir: &Path, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_render_cleans_model_first() {
        let source = render_contract(&EchoRenderer, json!({ "name": "Token", "events": [] }));
        assert_eq!(source.unwrap(), "Token");
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let err = render_contract(&EchoRenderer, json!({ "events": [], "meta": null })).unwrap_err();
        assert!(matches!(err, ToolchainError::Validation(_)));
    }

    #[test]
    fn test_empty_render_output_is_rejected() {
        let err = render_contract(&EchoRenderer, json!({ "name": "  " })).unwrap_err();
        assert!(err.to_string().contains("empty contract source"));
    }
}

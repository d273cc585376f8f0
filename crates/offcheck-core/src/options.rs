//! Compiler options resolution from the project's tsconfig.

use std::io::ErrorKind;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{CompilerOptions, OptionsError, PipelineConfig};
use crate::pipeline::CompilerState;
use crate::services::CompilerOptionsResolver;

/// Reads `compilerOptions` from `<cwd>/<tsconfig>` and applies pipeline overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsconfigResolver;

impl TsconfigResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompilerOptionsResolver for TsconfigResolver {
    async fn resolve(
        &self,
        config: &PipelineConfig,
        _state: &CompilerState,
    ) -> Result<CompilerOptions, OptionsError> {
        let path = config.resolve(&config.tsconfig);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => OptionsError::NotFound { path: path.clone() },
                _ => OptionsError::Io {
                    path: path.clone(),
                    source,
                },
            })?;

        let doc: Value = serde_json::from_str(&raw).map_err(|e| OptionsError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut options = match doc.get("compilerOptions") {
            None => CompilerOptions::new(),
            Some(Value::Object(map)) => CompilerOptions::from(map.clone()),
            Some(_) => {
                return Err(OptionsError::Malformed {
                    path,
                    reason: "compilerOptions must be an object".to_string(),
                })
            }
        };
        apply_pipeline_overrides(config, &mut options);
        Ok(options)
    }
}

/// Force the emit settings the pipeline needs.
///
/// Validation only emits declarations, into the first configured types
/// directory; with no types directory it emits nothing.
pub fn apply_pipeline_overrides(config: &PipelineConfig, options: &mut CompilerOptions) {
    match config.types_dir() {
        Some(types_dir) => {
            options.remove("noEmit");
            options.insert("declaration", true);
            options.insert("emitDeclarationOnly", true);
            options.insert("declarationDir", types_dir.to_string_lossy().into_owned());
        }
        None => {
            options.insert("noEmit", true);
            options.remove("declaration");
            options.remove("emitDeclarationOnly");
        }
    }
}

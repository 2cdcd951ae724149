use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;

/// Codec limits. The depth guard bounds recursion explicitly so that
/// hostile or runaway nesting fails with an error instead of exhausting
/// the stack; the size ceiling bounds worst-case decode allocations.
#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Optional ceiling on a single document's declared size, in bytes.
    #[serde(default)]
    pub max_document_size: Option<i32>,
    pub log_level: Option<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_document_size: None,
            log_level: None,
        }
    }
}

impl CodecConfig {
    /// Load configuration from a TOML file. If `path_opt` is None or the
    /// file is missing/unreadable, returns defaults. Parsing errors are
    /// returned.
    pub fn load_from_file(path_opt: Option<&str>) -> Result<Self> {
        let path = path_opt.unwrap_or("oxibson.toml");
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<CodecConfig>(&contents) {
                Ok(cfg) => Ok(cfg),
                Err(e) => Err(Error::Msg(format!("Failed to parse {}: {}", path, e))),
            },
            Err(_e) => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::Msg("max_depth must be at least 1".to_string()));
        }
        if let Some(size) = self.max_document_size {
            // 5 bytes is the smallest legal document
            if size < 5 {
                return Err(Error::Msg(format!(
                    "max_document_size must be at least 5, got {}",
                    size
                )));
            }
        }
        Ok(())
    }
}

fn default_max_depth() -> usize {
    1000
}

//! Turning a run's results into output documents.
//!
//! Renderers are pure: they produce an [`Artifact`] and never write it
//! anywhere themselves. Artifacts are written once every feed is done.

mod json;
mod text;

pub use json::JsonRenderer;
pub use text::TextRenderer;

use std::io::Write;
use std::path::Path;

use crate::app::Result;
use crate::config::{Config, OutputConfig, OutputFormat};
use crate::worker::FeedResult;

/// A rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: OutputFormat,
    pub body: String,
}

impl Artifact {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Write to `path`, or to standard output when there is none.
    pub fn write_to(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(path, &self.body)?;
                tracing::debug!("Wrote {} bytes to {}", self.body.len(), path.display());
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(self.body.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

pub trait Renderer: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn render(&self, results: &[FeedResult]) -> Result<Artifact>;
}

/// Build the renderer for one `[[outputs]]` entry.
pub fn renderer_for(output: &OutputConfig, config: &Config) -> Box<dyn Renderer> {
    match output.format {
        OutputFormat::Text => Box::new(TextRenderer::new(config.defaults.show_dates)),
        OutputFormat::Json => Box::new(JsonRenderer::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_to_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("run.txt");
        let artifact = Artifact {
            format: OutputFormat::Text,
            body: "hello\n".into(),
        };

        artifact.write_to(Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_renderer_for_format() {
        let config = Config::default();
        let json = OutputConfig {
            format: OutputFormat::Json,
            path: None,
        };
        assert_eq!(renderer_for(&json, &config).format(), OutputFormat::Json);
        assert_eq!(
            renderer_for(&OutputConfig::default(), &config).format(),
            OutputFormat::Text
        );
    }
}

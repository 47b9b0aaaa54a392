use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{BatchError, Result};
use crate::renderer::shaders::ShaderType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatcherSettings {
    /// Pipelines to build a batcher for. Shaders not listed are never compiled.
    #[serde(default = "BatcherSettings::default_requested_shaders")]
    pub requested_shaders: Vec<ShaderType>,
    /// Skip submissions identical to one already queued in the same frame.
    #[serde(default)]
    pub deduplicate_submissions: bool,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self {
            requested_shaders: Self::default_requested_shaders(),
            deduplicate_submissions: false,
            present_mode: PresentModeSetting::default(),
        }
    }
}

impl BatcherSettings {
    pub fn load() -> Self {
        Self::load_from_path("batcher.json")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!("Loaded batcher settings from {:?}", path);
                    settings
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default batcher settings.",
                        path, err
                    );
                    BatcherSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Batcher settings file {:?} not found. Using default settings.",
                    path
                );
                BatcherSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default batcher settings.",
                    path, err
                );
                BatcherSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let settings: BatcherSettings = serde_json::from_str(contents)?;
        Ok(settings.validate())
    }

    /// Replaces `requested_shaders` with the contents of a plain-text shader
    /// list. Unlike the JSON settings, a malformed list is an error.
    pub fn load_requested_shaders<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        self.requested_shaders = parse_requested_shaders(&contents)?;
        info!(
            "Loaded {} requested shaders from {:?}",
            self.requested_shaders.len(),
            path
        );
        Ok(self.validate())
    }

    fn validate(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.requested_shaders.len());
        for shader in self.requested_shaders.drain(..) {
            if seen.contains(&shader) {
                warn!("Shader {} requested more than once. Ignoring duplicate.", shader);
            } else {
                seen.push(shader);
            }
        }
        self.requested_shaders = seen;

        if self.requested_shaders.is_empty() {
            warn!("No shaders requested. Enabling every shader instead.");
            self.requested_shaders = Self::default_requested_shaders();
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    fn default_requested_shaders() -> Vec<ShaderType> {
        ShaderType::ALL.to_vec()
    }
}

/// Parses a requested-shaders list: one shader name per line, matched
/// case-insensitively. Blank lines are ignored.
pub fn parse_requested_shaders(text: &str) -> Result<Vec<ShaderType>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|name| {
            ShaderType::from_name(name).ok_or_else(|| BatchError::UnknownShader(name.to_owned()))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_drops_duplicate_shaders() {
        let settings = BatcherSettings {
            requested_shaders: vec![
                ShaderType::TransformVWithTextures,
                ShaderType::TransformVWithTextures,
                ShaderType::AbsolutePositionWithSolidColor,
            ],
            ..BatcherSettings::default()
        };

        assert_eq!(
            settings.validate().requested_shaders,
            vec![
                ShaderType::TransformVWithTextures,
                ShaderType::AbsolutePositionWithSolidColor
            ]
        );
    }

    #[test]
    fn validate_enables_every_shader_when_none_requested() {
        let settings = BatcherSettings {
            requested_shaders: Vec::new(),
            ..BatcherSettings::default()
        };

        assert_eq!(
            settings.validate().requested_shaders,
            ShaderType::ALL.to_vec()
        );
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: BatcherSettings =
            serde_json::from_str(r#"{ "requested_shaders": ["transform_v_with_textures"] }"#)
                .unwrap();

        assert_eq!(
            settings.requested_shaders,
            vec![ShaderType::TransformVWithTextures]
        );
        assert!(!settings.deduplicate_submissions);
        assert_eq!(settings.present_mode, PresentModeSetting::Fifo);
    }

    #[test]
    fn malformed_json_is_a_settings_error() {
        assert!(matches!(
            BatcherSettings::from_json("{ \"requested_shaders\": 3 }"),
            Err(BatchError::Settings(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = BatcherSettings::load_from_path("definitely/not/here/batcher.json");
        assert_eq!(settings, BatcherSettings::default());
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "shader-batcher-settings-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();

        let settings = BatcherSettings::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings, BatcherSettings::default());
    }

    #[test]
    fn parses_shader_list_case_insensitively() {
        let shaders = parse_requested_shaders(
            "TRANSFORM_V_WITH_TEXTURES\n\n  absolute_position_with_solid_color  \n",
        )
        .unwrap();

        assert_eq!(
            shaders,
            vec![
                ShaderType::TransformVWithTextures,
                ShaderType::AbsolutePositionWithSolidColor
            ]
        );
    }

    #[test]
    fn unknown_shader_name_is_an_error() {
        let err = parse_requested_shaders("absolute_position_with_solid_color\nwobbly_lines\n")
            .unwrap_err();
        assert!(matches!(err, BatchError::UnknownShader(name) if name == "wobbly_lines"));
    }

    #[test]
    fn loading_a_shader_list_replaces_requested_shaders() {
        let path = std::env::temp_dir().join(format!(
            "shader-batcher-requested-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "transform_v_with_textures\n").unwrap();

        let settings = BatcherSettings::default()
            .load_requested_shaders(&path)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            settings.requested_shaders,
            vec![ShaderType::TransformVWithTextures]
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = BatcherSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..BatcherSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = BatcherSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..BatcherSettings::default()
        };

        assert_eq!(
            settings.present_mode(&[wgpu::PresentMode::Immediate]),
            wgpu::PresentMode::Immediate
        );
    }
}

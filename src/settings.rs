use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Capacities and texture-unit configuration of a [`Renderer`](crate::renderer::Renderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Quads per 2D batch.
    #[serde(default = "RendererSettings::default_batch_capacity")]
    pub batch_capacity_2d: u32,
    /// Submissions per 3D batch.
    #[serde(default = "RendererSettings::default_batch_capacity")]
    pub batch_capacity_3d: u32,
    /// Vertices per shared vertex buffer.
    #[serde(default = "RendererSettings::default_vertex_capacity")]
    pub vertex_capacity: u32,
    /// Indices per shared vertex buffer.
    #[serde(default = "RendererSettings::default_index_capacity")]
    pub index_capacity: u32,
    #[serde(default = "RendererSettings::default_texture_units")]
    pub texture_units: u32,
    #[serde(default)]
    pub reserved_texture_units: u32,
    /// `int[]` uniform receiving the unit table `[0, 1, .., texture_units - 1]`.
    #[serde(default = "RendererSettings::default_unit_table_uniform")]
    pub unit_table_uniform: String,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            batch_capacity_2d: Self::default_batch_capacity(),
            batch_capacity_3d: Self::default_batch_capacity(),
            vertex_capacity: Self::default_vertex_capacity(),
            index_capacity: Self::default_index_capacity(),
            texture_units: Self::default_texture_units(),
            reserved_texture_units: 0,
            unit_table_uniform: Self::default_unit_table_uniform(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RendererSettings {
    /// Loads settings from a JSON file, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(settings) => {
                info!("Loaded renderer settings from {:?}", path);
                settings
            }
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Renderer settings file {:?} not found. Using default settings.",
                    path
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    "{} ({:?}). Falling back to default renderer settings.",
                    err, path
                );
                Self::default()
            }
        }
    }

    pub fn try_load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses injected JSON config. Invalid values are replaced by defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: RendererSettings = serde_json::from_str(json)?;
        Ok(settings.validate())
    }

    pub fn validate(mut self) -> Self {
        if self.batch_capacity_2d == 0 {
            warn!("2D batch capacity must be greater than zero. Using default value.");
            self.batch_capacity_2d = Self::default_batch_capacity();
        }

        if self.batch_capacity_3d == 0 {
            warn!("3D batch capacity must be greater than zero. Using default value.");
            self.batch_capacity_3d = Self::default_batch_capacity();
        }

        if self.vertex_capacity == 0 || self.index_capacity == 0 {
            warn!("Vertex and index capacities must be greater than zero. Using default values.");
            self.vertex_capacity = Self::default_vertex_capacity();
            self.index_capacity = Self::default_index_capacity();
        }

        // Draw commands address vertices with a signed base vertex.
        if self.vertex_capacity > i32::MAX as u32 {
            warn!(
                "Vertex capacity {} exceeds {}. Clamping.",
                self.vertex_capacity,
                i32::MAX
            );
            self.vertex_capacity = i32::MAX as u32;
        }

        if self.texture_units == 0 {
            warn!("Texture unit count must be greater than zero. Using default value.");
            self.texture_units = Self::default_texture_units();
        }

        if self.reserved_texture_units >= self.texture_units {
            warn!(
                "{} reserved texture units leave none of {} for batching. Reserving none.",
                self.reserved_texture_units, self.texture_units
            );
            self.reserved_texture_units = 0;
        }

        if self.unit_table_uniform.is_empty() {
            warn!("Unit table uniform name is empty. Using default name.");
            self.unit_table_uniform = Self::default_unit_table_uniform();
        }

        self
    }

    /// Quads per 2D batch times six indices.
    pub fn quad_index_count(&self) -> u64 {
        self.batch_capacity_2d as u64 * 6
    }

    const fn default_batch_capacity() -> u32 {
        10_000
    }

    const fn default_vertex_capacity() -> u32 {
        1_000_000
    }

    const fn default_index_capacity() -> u32 {
        3_000_000
    }

    const fn default_texture_units() -> u32 {
        16
    }

    fn default_unit_table_uniform() -> String {
        "u_textures".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values() {
        let settings = RendererSettings {
            batch_capacity_2d: 0,
            batch_capacity_3d: 0,
            vertex_capacity: 0,
            texture_units: 0,
            reserved_texture_units: 16,
            unit_table_uniform: String::new(),
            ..RendererSettings::default()
        }
        .validate();

        assert_eq!(settings, RendererSettings::default());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings =
            RendererSettings::from_json_str(r#"{ "batch_capacity_2d": 64, "reserved_texture_units": 2 }"#)
                .unwrap();
        assert_eq!(settings.batch_capacity_2d, 64);
        assert_eq!(settings.reserved_texture_units, 2);
        assert_eq!(settings.texture_units, 16);
        assert_eq!(settings.unit_table_uniform, "u_textures");
        assert_eq!(settings.quad_index_count(), 384);
    }

    #[test]
    fn reservations_must_leave_a_free_unit() {
        let settings =
            RendererSettings::from_json_str(r#"{ "texture_units": 4, "reserved_texture_units": 4 }"#)
                .unwrap();
        assert_eq!(settings.reserved_texture_units, 0);
    }

    #[test]
    fn vertex_capacity_fits_a_signed_base_vertex() {
        let settings = RendererSettings {
            vertex_capacity: u32::MAX,
            ..RendererSettings::default()
        }
        .validate();
        assert_eq!(settings.vertex_capacity, i32::MAX as u32);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            RendererSettings::from_json_str("{ not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RendererSettings::load_from_path("definitely/not/here.json");
        assert_eq!(settings, RendererSettings::default());
    }
}

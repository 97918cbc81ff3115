// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::surface::{HeapAllocator, SurfaceAllocator};
use crate::constants::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name under the user's config dir
const CONFIG_DIR_NAME: &str = "camera-effects";
const CONFIG_FILE_NAME: &str = "config.json";

/// Memory used for the pipeline's output surfaces
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SurfaceBackend {
    /// Plain process memory
    #[default]
    Heap,
    /// Anonymous memfd mapping, shareable by file descriptor (Linux only)
    Memfd,
}

impl SurfaceBackend {
    /// Allocator for this backend
    ///
    /// Memfd falls back to heap memory on platforms without memfd.
    pub fn allocator(&self) -> Box<dyn SurfaceAllocator> {
        match self {
            Self::Heap => Box::new(HeapAllocator),
            #[cfg(target_os = "linux")]
            Self::Memfd => Box::new(crate::backends::surface::MemfdAllocator),
            #[cfg(not(target_os = "linux"))]
            Self::Memfd => {
                warn!("memfd surfaces are not available on this platform, using heap");
                Box::new(HeapAllocator)
            }
        }
    }
}

impl std::fmt::Display for SurfaceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heap => write!(f, "heap"),
            Self::Memfd => write!(f, "memfd"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame width the pipeline is created for
    pub width: u32,
    /// Frame height the pipeline is created for
    pub height: u32,
    /// Output surface memory
    pub surface_backend: SurfaceBackend,
    /// Thread name of the processing worker
    pub worker_name: String,
    /// Scale background images to the frame size instead of rejecting them
    pub fit_background: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            surface_backend: SurfaceBackend::default(),
            worker_name: "effects".to_string(),
            fit_background: true,
        }
    }
}

impl Config {
    /// Default location, `<config dir>/camera-effects/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or defaults if the file does not exist
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PipelineError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(
            path = %path.display(),
            width = config.width,
            height = config.height,
            surface_backend = %config.surface_backend,
            "Loaded config"
        );
        Ok(config)
    }

    /// Load from the default location
    pub fn load_default() -> PipelineResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::Config(format!(
                "Frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

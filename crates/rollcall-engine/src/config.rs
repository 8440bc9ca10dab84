use std::path::{Path, PathBuf};

use rollcall_core::DEFAULT_MATCH_THRESHOLD;
use rollcall_store::RecordPolicy;
use serde::Deserialize;
use thiserror::Error;

/// Default number of photos per enrollment.
pub const DEFAULT_ENROLLMENT_IMAGES: usize = 10;
/// Default cut-off, in percent, for the low-attendance report.
pub const DEFAULT_LOW_ATTENDANCE: f64 = 75.0;

const DETECTOR_MODEL: &str = "yolov8n-face.onnx";
const EMBEDDER_MODEL: &str = "facenet512.onnx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Shape of the optional TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub model_dir: Option<PathBuf>,
    pub detector_model: Option<String>,
    pub embedder_model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub enrollment_db: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub dataset_dir: Option<PathBuf>,
    pub match_threshold: Option<f32>,
    pub low_attendance_threshold: Option<f64>,
    pub enrollment_images: Option<usize>,
    pub record_policy: Option<RecordPolicy>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detector model file name, relative to `model_dir`.
    pub detector_model: String,
    /// Embedder model file name, relative to `model_dir`.
    pub embedder_model: String,
    /// Path to the SQLite enrollment database.
    pub enrollment_db: PathBuf,
    /// Path to the attendance CSV.
    pub ledger_path: PathBuf,
    /// Where enrollment photos are kept, one directory per student.
    pub dataset_dir: PathBuf,
    /// Maximum Euclidean distance accepted as a match.
    pub match_threshold: f32,
    /// Rates strictly below this percentage are reported as low.
    pub low_attendance_threshold: f64,
    /// Exact number of photos an enrollment takes.
    pub enrollment_images: usize,
    pub record_policy: RecordPolicy,
}

impl Config {
    /// Load from `ROLLCALL_*` environment variables, layered over the TOML
    /// file named by `ROLLCALL_CONFIG` if set, layered over defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => ConfigFile::read(Path::new(&path))?,
            None => ConfigFile::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Build a config from a parsed file and an environment lookup.
    /// Environment values win over the file; unparseable or out-of-range
    /// values are ignored.
    pub fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_path = |key: &str| env(key).map(PathBuf::from);

        let data_dir = env_path("ROLLCALL_DATA_DIR")
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&env));

        let model_dir = env_path("ROLLCALL_MODEL_DIR")
            .or(file.model_dir)
            .unwrap_or_else(|| data_dir.join("models"));

        Self {
            model_dir,
            detector_model: env("ROLLCALL_DETECTOR_MODEL")
                .or(file.detector_model)
                .unwrap_or_else(|| DETECTOR_MODEL.to_string()),
            embedder_model: env("ROLLCALL_EMBEDDER_MODEL")
                .or(file.embedder_model)
                .unwrap_or_else(|| EMBEDDER_MODEL.to_string()),
            enrollment_db: env_path("ROLLCALL_ENROLLMENT_DB")
                .or(file.enrollment_db)
                .unwrap_or_else(|| data_dir.join("faces.db")),
            ledger_path: env_path("ROLLCALL_LEDGER_PATH")
                .or(file.ledger_path)
                .unwrap_or_else(|| data_dir.join("attendance.csv")),
            dataset_dir: env_path("ROLLCALL_DATASET_DIR")
                .or(file.dataset_dir)
                .unwrap_or_else(|| data_dir.join("dataset")),
            match_threshold: checked(&env, "ROLLCALL_MATCH_THRESHOLD", file.match_threshold, non_negative_f32)
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
            low_attendance_threshold: checked(&env, "ROLLCALL_LOW_ATTENDANCE", file.low_attendance_threshold, non_negative_f64)
                .unwrap_or(DEFAULT_LOW_ATTENDANCE),
            enrollment_images: checked(&env, "ROLLCALL_ENROLLMENT_IMAGES", file.enrollment_images, positive)
                .unwrap_or(DEFAULT_ENROLLMENT_IMAGES),
            record_policy: env_parse(&env, "ROLLCALL_RECORD_POLICY")
                .or(file.record_policy)
                .unwrap_or_default(),
        }
    }

    /// Everything under one directory, with default model names and thresholds.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self::resolve(
            ConfigFile {
                data_dir: Some(data_dir),
                ..ConfigFile::default()
            },
            |_| None,
        )
    }

    /// Path to the YOLO face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the FaceNet embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join(&self.embedder_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// The environment value for `key`, else the file value, skipping either
/// one with a warning when `valid` rejects it.
fn checked<T: std::str::FromStr + std::fmt::Debug>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    from_file: Option<T>,
    valid: fn(&T) -> bool,
) -> Option<T> {
    let keep = |source: &str, value: T| {
        if valid(&value) {
            Some(value)
        } else {
            tracing::warn!(key, source, value = ?value, "ignoring out-of-range config value");
            None
        }
    };
    env_parse(env, key)
        .and_then(|v| keep("environment", v))
        .or_else(|| from_file.and_then(|v| keep("file", v)))
}

fn non_negative_f32(v: &f32) -> bool {
    v.is_finite() && *v >= 0.0
}

fn non_negative_f64(v: &f64) -> bool {
    v.is_finite() && *v >= 0.0
}

fn positive(v: &usize) -> bool {
    *v > 0
}

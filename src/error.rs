use thiserror::Error;

/// Top-level error for the try-on library.
#[derive(Error, Debug)]
pub enum TryOnError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("unprojection failed: {0}")]
    Unproject(#[from] UnprojectError),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("invalid face topology: {0}")]
    Topology(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("duplicate accessory id: {0}")]
    DuplicateId(String),

    #[error("accessory {id} declares {declared} instances, category {category} needs {expected}")]
    InstanceCount {
        id: String,
        category: String,
        declared: usize,
        expected: usize,
    },

    #[error("unknown accessory id: {0}")]
    UnknownId(String),

    #[error("catalog is empty")]
    Empty,
}

/// Numeric failures of the screen-to-world mapping.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum UnprojectError {
    #[error("ray is parallel to the target plane (dir.z = {0})")]
    RayParallel(f32),

    #[error("target plane lies behind the camera")]
    BehindCamera,

    #[error("camera transform produced a non-finite value")]
    NonFinite,
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to read asset {path}: {message}")]
    Read { path: String, message: String },

    #[error("asset is empty: {0}")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown mesh handle {0}")]
    UnknownMesh(u64),

    #[error("mesh kind mismatch for handle {0}")]
    KindMismatch(u64),

    #[error("failed to write snapshot {path}: {message}")]
    Snapshot { path: String, message: String },
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector backend {0} is not compiled in")]
    BackendUnavailable(String),

    #[error("detector initialization failed: {0}")]
    Init(String),

    #[error("failed to parse detector packet: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, TryOnError>;

//! Accessory model loading.
//!
//! Model files are treated as opaque bytes handed to the renderer. When a file
//! cannot be read the accessory falls back to a placeholder box, so a broken
//! asset never stops the session.

use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::catalog::{AccessoryCategory, AccessoryDescriptor};
use crate::error::AssetError;
use crate::scene::Geometry;
use crate::types::{Placement, Rotation};

#[derive(Clone, Debug, PartialEq)]
pub struct ModelAsset {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Axis-aligned box standing in for a model that failed to load.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaceholderShape {
    pub half_extents: Vec3,
}

impl PlaceholderShape {
    pub fn for_category(category: AccessoryCategory) -> Self {
        let half_extents = match category {
            AccessoryCategory::Glasses => Vec3::new(0.07, 0.02, 0.01),
            AccessoryCategory::Earrings => Vec3::splat(0.008),
            AccessoryCategory::Necklace => Vec3::new(0.06, 0.015, 0.01),
            AccessoryCategory::Shirt => Vec3::new(0.12, 0.15, 0.03),
        };
        Self { half_extents }
    }
}

impl Default for PlaceholderShape {
    fn default() -> Self {
        Self {
            half_extents: Vec3::splat(0.05),
        }
    }
}

pub trait AssetLoader {
    fn load(&self, descriptor: &AccessoryDescriptor) -> Result<ModelAsset, AssetError>;
}

/// Reads model files relative to an asset root.
#[derive(Clone, Debug)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, descriptor: &AccessoryDescriptor) -> PathBuf {
        if descriptor.asset_path.is_absolute() {
            descriptor.asset_path.clone()
        } else {
            self.root.join(&descriptor.asset_path)
        }
    }
}

impl AssetLoader for FileAssetLoader {
    fn load(&self, descriptor: &AccessoryDescriptor) -> Result<ModelAsset, AssetError> {
        let path = self.resolve(descriptor);
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(&path).map_err(|e| AssetError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(AssetError::Empty(path.display().to_string()));
        }
        Ok(ModelAsset { path, bytes })
    }
}

/// Geometry the orchestrator uploads for one accessory.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedAccessory {
    pub geometry: Geometry,
    pub placeholder: bool,
}

pub fn load_or_placeholder(loader: &dyn AssetLoader, descriptor: &AccessoryDescriptor) -> LoadedAccessory {
    match loader.load(descriptor) {
        Ok(asset) => {
            log::info!(
                "loaded {} ({} bytes) from {}",
                descriptor.id,
                asset.bytes.len(),
                asset.path.display()
            );
            LoadedAccessory {
                geometry: Geometry::Model(asset),
                placeholder: false,
            }
        }
        Err(err) => {
            log::warn!("{}: {err}, using placeholder", descriptor.id);
            LoadedAccessory {
                geometry: Geometry::Placeholder(PlaceholderShape::for_category(descriptor.category)),
                placeholder: true,
            }
        }
    }
}

/// Where an accessory rests before the first tracked frame.
pub fn default_placement(category: AccessoryCategory) -> Placement {
    let position = match category {
        AccessoryCategory::Glasses => Vec3::new(0.0, 0.05, -0.15),
        AccessoryCategory::Earrings => Vec3::new(0.0, -0.05, -0.25),
        AccessoryCategory::Necklace => Vec3::new(0.0, -0.25, -0.3),
        AccessoryCategory::Shirt => Vec3::new(0.0, -0.5, -0.35),
    };
    let positions = match category.instance_count() {
        2 => vec![position - Vec3::X * 0.12, position + Vec3::X * 0.12],
        _ => vec![position],
    };
    Placement {
        positions,
        rotation: Rotation::IDENTITY,
        scale: 1.0,
        visible: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn missing_file_falls_back_to_placeholder() {
        let loader = FileAssetLoader::new("/nonexistent/asset/root");
        let catalog = Catalog::builtin();
        let loaded = load_or_placeholder(&loader, catalog.first());
        assert!(loaded.placeholder);
        assert!(matches!(loaded.geometry, Geometry::Placeholder(_)));
    }

    #[test]
    fn existing_file_is_read() {
        let dir = std::env::temp_dir().join(format!("tryon-assets-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("glasses")).unwrap();
        std::fs::write(dir.join("glasses/aviator.glb"), b"glTF").unwrap();

        let loader = FileAssetLoader::new(&dir);
        let catalog = Catalog::builtin();
        let descriptor = catalog.require("glasses-aviator").unwrap();
        let asset = loader.load(descriptor).unwrap();
        assert_eq!(asset.bytes, b"glTF");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn default_placement_matches_instance_count() {
        for category in AccessoryCategory::ALL {
            let placement = default_placement(category);
            assert_eq!(placement.positions.len(), category.instance_count());
            assert!(placement.visible);
        }
    }
}

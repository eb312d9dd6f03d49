//! Static accessory catalog.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, TryOnError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryCategory {
    Glasses,
    Earrings,
    Necklace,
    Shirt,
}

impl AccessoryCategory {
    pub const ALL: [AccessoryCategory; 4] = [
        AccessoryCategory::Glasses,
        AccessoryCategory::Earrings,
        AccessoryCategory::Necklace,
        AccessoryCategory::Shirt,
    ];

    pub fn instance_count(&self) -> usize {
        match self {
            AccessoryCategory::Earrings => 2,
            _ => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessoryCategory::Glasses => "glasses",
            AccessoryCategory::Earrings => "earrings",
            AccessoryCategory::Necklace => "necklace",
            AccessoryCategory::Shirt => "shirt",
        }
    }

    pub fn needs_face(&self) -> bool {
        matches!(self, AccessoryCategory::Glasses | AccessoryCategory::Earrings)
    }
}

impl fmt::Display for AccessoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessoryDescriptor {
    pub id: String,
    pub name: String,
    pub asset_path: PathBuf,
    pub category: AccessoryCategory,
    pub instance_count: usize,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "accessory")]
    accessories: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    name: String,
    asset_path: PathBuf,
    category: AccessoryCategory,
    #[serde(default)]
    instance_count: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Catalog {
    accessories: Vec<AccessoryDescriptor>,
}

impl Catalog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TryOnError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_str(&contents)
    }

    pub fn from_str(s: &str) -> Result<Self, TryOnError> {
        let file: CatalogFile =
            toml::from_str(s).map_err(|e| CatalogError::Parse(e.to_string()))?;

        let accessories = file
            .accessories
            .into_iter()
            .map(|entry| {
                let expected = entry.category.instance_count();
                let declared = entry.instance_count.unwrap_or(expected);
                if declared != expected {
                    return Err(CatalogError::InstanceCount {
                        id: entry.id,
                        category: entry.category.to_string(),
                        declared,
                        expected,
                    });
                }
                Ok(AccessoryDescriptor {
                    id: entry.id,
                    name: entry.name,
                    asset_path: entry.asset_path,
                    category: entry.category,
                    instance_count: declared,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(accessories)?)
    }

    pub fn new(accessories: Vec<AccessoryDescriptor>) -> Result<Self, CatalogError> {
        if accessories.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for accessory in &accessories {
            if !seen.insert(accessory.id.as_str()) {
                return Err(CatalogError::DuplicateId(accessory.id.clone()));
            }
        }
        Ok(Self { accessories })
    }

    /// The list shipped with the viewer.
    pub fn builtin() -> Self {
        let entry = |id: &str, name: &str, path: &str, category: AccessoryCategory| {
            AccessoryDescriptor {
                id: id.to_string(),
                name: name.to_string(),
                asset_path: PathBuf::from(path),
                category,
                instance_count: category.instance_count(),
            }
        };
        Self {
            accessories: vec![
                entry("glasses-aviator", "Aviator", "glasses/aviator.glb", AccessoryCategory::Glasses),
                entry("glasses-round", "Round Frames", "glasses/round.glb", AccessoryCategory::Glasses),
                entry("earrings-hoop", "Gold Hoops", "earrings/hoop.glb", AccessoryCategory::Earrings),
                entry("earrings-pearl", "Pearl Drops", "earrings/pearl.glb", AccessoryCategory::Earrings),
                entry("necklace-chain", "Chain Necklace", "necklace/chain.glb", AccessoryCategory::Necklace),
                entry("shirt-tee", "Basic Tee", "shirt/tee.glb", AccessoryCategory::Shirt),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&AccessoryDescriptor> {
        self.accessories.iter().find(|a| a.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&AccessoryDescriptor, CatalogError> {
        self.get(id)
            .ok_or_else(|| CatalogError::UnknownId(id.to_string()))
    }

    pub fn first(&self) -> &AccessoryDescriptor {
        // Construction rejects empty catalogs.
        &self.accessories[0]
    }

    pub fn by_category(&self, category: AccessoryCategory) -> impl Iterator<Item = &AccessoryDescriptor> {
        self.accessories.iter().filter(move |a| a.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessoryDescriptor> {
        self.accessories.iter()
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }
}

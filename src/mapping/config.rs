//! TOML mapping files.
//!
//! ```toml
//! [shapes.Person]
//! FirstName = "string"
//! Age = "integer"
//!
//! [[maps]]
//! source = "Person"
//! destination = "PersonView"
//! [maps.members]
//! Years = "Age"
//! FullName = { expression = "FirstName + ' ' + LastName" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{MappingConfiguration, MemberSource, TypeMap};
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::value::ValueType;

#[derive(Debug, Deserialize)]
struct MappingFile {
    #[serde(default)]
    shapes: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    maps: Vec<MapEntry>,
}

#[derive(Debug, Deserialize)]
struct MapEntry {
    source: String,
    destination: String,
    #[serde(default)]
    members: BTreeMap<String, MemberEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemberEntry {
    Member(String),
    Expression { expression: String },
}

impl MappingConfiguration {
    /// Parse a mapping configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: MappingFile =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid mapping file: {}", e)))?;

        let mut config = MappingConfiguration::new();
        for (name, members) in file.shapes {
            let mut shape = Shape::new(name);
            for (member, ty) in members {
                let ty: ValueType = ty.parse()?;
                shape = shape.with_member(member, ty);
            }
            config.add_shape(shape);
        }
        for entry in file.maps {
            let map = entry
                .members
                .into_iter()
                .fold(TypeMap::new(entry.source, entry.destination), |map, (dest, src)| {
                    let source = match src {
                        MemberEntry::Member(name) => MemberSource::Member(name),
                        MemberEntry::Expression { expression } => MemberSource::Expression(expression),
                    };
                    map.for_member(dest, source)
                });
            config.add_map(map);
        }
        Ok(config)
    }
}

/// Load a mapping configuration from a TOML file.
pub fn load_configuration(path: &Path) -> Result<MappingConfiguration> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let config = MappingConfiguration::from_toml_str(&text)?;
    debug!(path = %path.display(), maps = config.maps().len(), "loaded mapping configuration");
    Ok(config)
}

/// Load the configuration at the default path, or `None` if there is none.
pub fn load_default_configuration() -> Result<Option<MappingConfiguration>> {
    let path = default_config_path()?;
    if !path.exists() {
        return Ok(None);
    }
    load_configuration(&path).map(Some)
}

/// `<config dir>/dynproj/mapping.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("could not determine config directory".into()))?;
    Ok(config_dir.join("dynproj").join("mapping.toml"))
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mesh container formats the backend produces. The wire value is the file
/// extension as stored, in any case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AssetFormat {
    Obj,
    Gltf,
    Glb,
    Ply,
}

impl AssetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Obj => "obj",
            Self::Gltf => "gltf",
            Self::Glb => "glb",
            Self::Ply => "ply",
        }
    }
}

impl FromStr for AssetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "obj" => Ok(Self::Obj),
            "gltf" => Ok(Self::Gltf),
            "glb" => Ok(Self::Glb),
            "ply" => Ok(Self::Ply),
            other => Err(format!("unknown asset format '{}'", other)),
        }
    }
}

impl TryFrom<String> for AssetFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The two asset collections the backend serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Bodies,
    Clothes,
}

impl Collection {
    /// Path of the list endpoint, relative to the base URL
    pub fn list_path(&self) -> &'static str {
        match self {
            Self::Bodies => "/bodies/",
            Self::Clothes => "/clothes/",
        }
    }

    /// JSON key holding the asset array in the list response
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::Bodies => "bodies",
            Self::Clothes => "clothes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_key())
    }
}

/// One generated or preset 3D model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    /// Server path, e.g. `/outputs/clothes/shirt.glb`
    pub url: String,
    pub format: AssetFormat,
    #[serde(rename = "thumbnail", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_preset: bool,
}

impl Asset {
    /// Build the client-side placeholder for a freshly generated model before
    /// the catalog has confirmed it.
    pub fn generated(url: &str, thumbnail_url: Option<String>) -> Option<Self> {
        let name = crate::services::viewer_handoff::filename_from_url(url);
        let format = name.rsplit_once('.')?.1.parse().ok()?;
        Some(Self {
            name,
            url: url.to_string(),
            format,
            thumbnail_url,
            is_preset: false,
        })
    }
}

use crate::logi;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

const CHARACTERS_FILE: &str = "characters.json";
const BACKGROUNDS_FILE: &str = "backgrounds.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Character,
    Background,
}

impl AssetKind {
    /// In-text marker, including the separating space.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Character => "@char ",
            Self::Background => "@back ",
        }
    }

    /// Prefix of the machine-safe reference tag sent to the image API.
    pub fn tag_prefix(self) -> &'static str {
        match self {
            Self::Character => "char",
            Self::Background => "back",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character => write!(f, "character"),
            Self::Background => write!(f, "background"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    pub description: String,
    pub image_path: Option<PathBuf>,
}

impl Profile {
    pub fn new(kind: AssetKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            kind,
            description: String::new(),
            image_path: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Image path, if one is set and non-empty.
    pub fn usable_image(&self) -> Option<&Path> {
        self.image_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Read-only access to registered character and background profiles.
pub trait ProfileLookup: Send + Sync {
    /// Case-insensitive lookup by profile name.
    fn get_by_name(&self, name: &str, kind: AssetKind) -> Option<Profile>;
}

#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    characters: Vec<Profile>,
    backgrounds: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterRecord {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    text_profile: String,
    #[serde(default)]
    image_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct CharacterFile {
    #[serde(default)]
    characters: Vec<CharacterRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackgroundRecord {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct BackgroundFile {
    #[serde(default)]
    backgrounds: Vec<BackgroundRecord>,
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.insert(profile);
        self
    }

    /// Adds a profile unless one with the same name (ignoring case) exists.
    pub fn insert(&mut self, profile: Profile) -> bool {
        if self.get_by_name(&profile.name, profile.kind).is_some() {
            return false;
        }
        match profile.kind {
            AssetKind::Character => self.characters.push(profile),
            AssetKind::Background => self.backgrounds.push(profile),
        }
        true
    }

    pub fn profiles(&self, kind: AssetKind) -> &[Profile] {
        match kind {
            AssetKind::Character => &self.characters,
            AssetKind::Background => &self.backgrounds,
        }
    }

    /// Loads `characters.json` and `backgrounds.json` from `dir`. A missing
    /// file contributes no profiles.
    pub async fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        let char_path = dir.join(CHARACTERS_FILE);
        if let Some(text) = read_optional(&char_path).await? {
            let file: CharacterFile = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", char_path.display()))?;
            for rec in file.characters {
                let profile = Profile {
                    id: rec.id,
                    name: rec.name,
                    kind: AssetKind::Character,
                    description: rec.text_profile,
                    image_path: non_empty_path(rec.image_path),
                };
                catalog.insert(profile);
            }
        }

        let back_path = dir.join(BACKGROUNDS_FILE);
        if let Some(text) = read_optional(&back_path).await? {
            let file: BackgroundFile = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", back_path.display()))?;
            for rec in file.backgrounds {
                let profile = Profile {
                    id: rec.id,
                    name: rec.name,
                    kind: AssetKind::Background,
                    description: rec.description,
                    image_path: non_empty_path(rec.image_path),
                };
                catalog.insert(profile);
            }
        }

        logi(format!(
            "Loaded profiles: {} characters, {} backgrounds ({})",
            catalog.characters.len(),
            catalog.backgrounds.len(),
            dir.display()
        ));
        Ok(catalog)
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
    }
}

impl ProfileLookup for ProfileCatalog {
    fn get_by_name(&self, name: &str, kind: AssetKind) -> Option<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let wanted = name.to_lowercase();
        self.profiles(kind)
            .iter()
            .find(|p| p.name.to_lowercase() == wanted)
            .cloned()
    }
}

/// Renders profiles as a context block for the chat model.
pub fn build_profile_context(profiles: &[Profile], kind: AssetKind) -> String {
    if profiles.is_empty() {
        return String::new();
    }

    let header = match kind {
        AssetKind::Character => "[등장인물 프로필]",
        AssetKind::Background => "[배경/장소 설정]",
    };

    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    for p in profiles {
        out.push_str(&format!("- {}: {}\n", p.name, p.description));
    }
    out
}

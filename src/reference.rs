use crate::logw;
use crate::profile::{AssetKind, ProfileLookup};
use crate::tags;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on reference images accepted by the image generation call.
pub const MAX_REFERENCE_ASSETS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceAsset {
    pub name: String,
    pub image_path: PathBuf,
    pub kind: AssetKind,
    pub ordinal: usize,
}

impl ReferenceAsset {
    /// `char_0`, `back_1`, ... Profile names are often Korean, which the
    /// image API rejects as reference tags.
    pub fn tag_name(&self) -> String {
        format!("{}_{}", self.kind.tag_prefix(), self.ordinal)
    }
}

/// `^[A-Za-z][A-Za-z0-9_]{2,}$`
pub fn is_valid_reference_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_with_letter
        && tag.len() >= 3
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct ReferenceAssetResolver {
    profiles: Arc<dyn ProfileLookup>,
}

impl ReferenceAssetResolver {
    pub fn new(profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { profiles }
    }

    pub fn has_any_reference_tags(&self, text: &str) -> bool {
        tags::has_any_reference_tags(text)
    }

    /// Backgrounds first, then characters, capped at [`MAX_REFERENCE_ASSETS`].
    /// `text` must still contain its tags.
    pub fn build_reference_assets(&self, text: &str) -> Vec<ReferenceAsset> {
        let mut out = Vec::new();

        for kind in [AssetKind::Background, AssetKind::Character] {
            for tag in tags::parse_tags(text, kind, self.profiles.as_ref()) {
                if out.len() >= MAX_REFERENCE_ASSETS {
                    return out;
                }

                let Some(profile) = self.profiles.get_by_name(&tag.resolved_name, kind) else {
                    continue;
                };
                let Some(image) = profile.usable_image() else {
                    logw(format!("{} {} has no image; skipping reference", kind, profile.name));
                    continue;
                };

                out.push(ReferenceAsset {
                    name: profile.name.clone(),
                    image_path: image.to_path_buf(),
                    kind,
                    ordinal: out.len(),
                });
            }
        }

        out
    }
}

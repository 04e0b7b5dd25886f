//! `@char <name>` / `@back <name>` tag extraction.
//!
//! Markers match case-insensitively. The name token is the run of
//! non-whitespace characters after the marker; one trailing Korean particle
//! is stripped from it to recover the profile name (`민수가` → `민수`).

use crate::error::ParseWarning;
use crate::logw;
use crate::profile::{AssetKind, ProfileLookup};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Checked in order; two-character particles come first so `에서` wins over `에`.
const KOREAN_PARTICLES: &[&str] = &[
    "에서", "에게", "으로", "처럼", "보다", "까지", "부터", "마저", "조차", "만큼", "과", "와",
    "을", "를", "이", "가", "은", "는", "로", "의", "에", "도", "만",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReference {
    pub kind: AssetKind,
    pub raw_name: String,
    pub resolved_name: String,
}

/// Result of resolving tags against the profile store.
#[derive(Debug, Clone, Default)]
pub struct TagScan {
    pub references: Vec<TagReference>,
    pub warnings: Vec<ParseWarning>,
}

pub fn strip_particle(word: &str) -> &str {
    for particle in KOREAN_PARTICLES {
        if let Some(stripped) = word.strip_suffix(particle) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    word
}

struct TagPatterns {
    /// Marker plus exactly one space, capturing the name token.
    scan: Regex,
    /// Marker plus any whitespace run, for removal.
    strip: Regex,
}

fn compile_patterns(kind: AssetKind) -> Result<TagPatterns> {
    let prefix = kind.tag_prefix();
    Ok(TagPatterns {
        scan: Regex::new(&format!(r"(?i)@{} (\S+)", prefix))
            .with_context(|| format!("failed to compile {} tag regex", prefix))?,
        strip: Regex::new(&format!(r"(?i)@{}\s+(\S+)", prefix))
            .with_context(|| format!("failed to compile {} strip regex", prefix))?,
    })
}

fn tag_patterns(kind: AssetKind) -> Result<&'static TagPatterns> {
    static CHAR_RE: OnceCell<TagPatterns> = OnceCell::new();
    static BACK_RE: OnceCell<TagPatterns> = OnceCell::new();
    let cell = match kind {
        AssetKind::Character => &CHAR_RE,
        AssetKind::Background => &BACK_RE,
    };
    cell.get_or_try_init(|| compile_patterns(kind))
}

/// Every marker occurrence of `kind`, in text order, with no profile check.
pub fn scan_tags(text: &str, kind: AssetKind) -> Vec<TagReference> {
    let patterns = match tag_patterns(kind) {
        Ok(p) => p,
        Err(err) => {
            logw(format!("{:#}", err));
            return Vec::new();
        }
    };

    patterns
        .scan
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| TagReference {
            kind,
            raw_name: m.as_str().to_string(),
            resolved_name: strip_particle(m.as_str()).to_string(),
        })
        .collect()
}

/// Tags of `kind` whose names resolve to a registered profile, de-duplicated
/// by resolved name in first-seen order, plus a warning per unknown name.
pub fn parse_tags_report(text: &str, kind: AssetKind, profiles: &dyn ProfileLookup) -> TagScan {
    let mut scan = TagScan::default();
    let mut seen: Vec<String> = Vec::new();

    for tag in scan_tags(text, kind) {
        let key = tag.resolved_name.to_lowercase();
        if seen.contains(&key) {
            continue;
        }

        if profiles.get_by_name(&tag.resolved_name, kind).is_none() {
            let warning = ParseWarning {
                kind,
                raw_name: tag.raw_name.clone(),
                resolved_name: tag.resolved_name.clone(),
            };
            logw(warning.to_string());
            if !scan.warnings.contains(&warning) {
                scan.warnings.push(warning);
            }
            continue;
        }

        seen.push(key);
        scan.references.push(tag);
    }

    scan
}

pub fn parse_tags(text: &str, kind: AssetKind, profiles: &dyn ProfileLookup) -> Vec<TagReference> {
    parse_tags_report(text, kind, profiles).references
}

/// Removes the marker word and the whitespace after it, keeping the name and
/// its particle in place: `@char 철수가 걷는다` → `철수가 걷는다`.
pub fn strip_tags(text: &str, kind: AssetKind) -> String {
    match tag_patterns(kind) {
        Ok(patterns) => patterns.strip.replace_all(text, "${1}").into_owned(),
        Err(err) => {
            logw(format!("{:#}", err));
            text.to_string()
        }
    }
}

/// Strips both marker kinds until nothing changes, then trims.
pub fn strip_all_tags(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_tags(
            &strip_tags(&current, AssetKind::Character),
            AssetKind::Background,
        );
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

pub fn has_any_reference_tags(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let lower = text.to_ascii_lowercase();
    lower.contains(AssetKind::Character.marker()) || lower.contains(AssetKind::Background.marker())
}

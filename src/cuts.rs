use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cut {
    pub index: u32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CutList {
    pub items: Vec<Cut>,
}

fn cut_header_regex() -> Result<&'static Regex> {
    static CUT_RE: OnceCell<Regex> = OnceCell::new();
    CUT_RE.get_or_try_init(|| {
        Regex::new(r"^Cut\s+(\d+)?").context("failed to compile cut header regex")
    })
}

impl CutList {
    /// Parses the chat model's cut split:
    ///
    /// ```text
    /// Cut 1 — 공항 도착
    /// 민수가 캐리어를 끌고 들어온다.
    /// Cut 2 — 재회
    /// ...
    /// ```
    ///
    /// Lines before the first header are ignored.
    pub fn from_gpt_text(text: &str) -> Result<Self> {
        let header = cut_header_regex()?;
        let mut items: Vec<Cut> = Vec::new();
        let mut current: Option<Cut> = None;

        for line in text.split(['\n', '\r']).map(str::trim) {
            if line.is_empty() || line.starts_with("GPT-컷분할") {
                continue;
            }

            if let Some(caps) = header.captures(line) {
                if let Some(done) = current.take() {
                    items.push(done);
                }

                let num = caps
                    .get(1)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(0);
                let index = if num > 0 { num } else { items.len() as u32 + 1 };

                let dash = line.find('—').map(|i| i + '—'.len_utf8()).or_else(|| line.find('-').map(|i| i + 1));
                let title = match dash {
                    Some(start) if start < line.len() => line[start..].trim().to_string(),
                    _ => line.to_string(),
                };

                current = Some(Cut {
                    index,
                    title,
                    description: String::new(),
                });
            } else if let Some(cut) = current.as_mut() {
                if !cut.description.is_empty() {
                    cut.description.push('\n');
                }
                cut.description.push_str(line);
            }
        }

        if let Some(done) = current {
            items.push(done);
        }
        Ok(Self { items })
    }
}

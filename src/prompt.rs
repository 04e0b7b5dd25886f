/// Joins every line after a line reading exactly `ENG` into one prompt.
/// Returns `None` when there is no such block or it is empty.
pub fn extract_eng_prompt(full_text: &str) -> Option<String> {
    let mut in_eng = false;
    let mut parts: Vec<&str> = Vec::new();

    for line in full_text.split(['\n', '\r']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "ENG" {
            in_eng = true;
            continue;
        }
        if in_eng {
            parts.push(line);
        }
    }

    let prompt = parts.join(" ");
    if prompt.is_empty() { None } else { Some(prompt) }
}

/// The `ENG` block if present, otherwise the whole text.
pub fn resolve_prompt(raw: &str) -> String {
    extract_eng_prompt(raw).unwrap_or_else(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eng_block_is_joined() {
        let text = "KOR\n민수가 공항에 들어간다\n\nENG\nA young man walks\r\ninto a bright airport.\n";
        assert_eq!(
            extract_eng_prompt(text).as_deref(),
            Some("A young man walks into a bright airport.")
        );
    }

    #[test]
    fn test_missing_or_empty_block() {
        assert_eq!(extract_eng_prompt("just a prompt"), None);
        assert_eq!(extract_eng_prompt("KOR\n설명\nENG\n  \n"), None);
        assert_eq!(resolve_prompt("  just a prompt \n"), "just a prompt");
    }

    #[test]
    fn test_eng_marker_must_be_whole_line() {
        assert_eq!(extract_eng_prompt("ENGLISH\nhello"), None);
        assert_eq!(resolve_prompt(" ENG \nhello"), "hello");
    }
}

use crate::config::Config;
use crate::cuts::CutList;
use crate::{logi, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MAX_SYNOPSIS_BYTES: usize = 60_000;
const TEMPERATURE: f32 = 0.7;

const CUT_SPLIT_SYSTEM_PROMPT: &str = "너는 영상 연출을 위한 컷 분할 보조 도우미야.\n\
규칙:\n\
- 시놉시스를 4~8개의 컷으로 나눈다.\n\
- 각 컷은 \"Cut <번호> — <짧은 제목>\" 한 줄로 시작한다.\n\
- 제목 다음 줄부터 장면 설명을 한국어로 1~3문장 쓴다.\n\
- 등장인물과 장소 이름은 시놉시스에 쓰인 그대로 유지한다.\n\
- 다른 머리말이나 맺음말은 쓰지 않는다.";

const REFINE_SYSTEM_PROMPT: &str = "You turn a Korean scene description into a prompt for a text-to-video model.\n\
Reply in exactly two blocks:\n\
KOR\n\
<one Korean sentence summarising the shot>\n\
ENG\n\
<one English paragraph, under 900 characters, describing subject, action, setting, camera and lighting>\n\
Keep character and place names in romanised form. No other text.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn chat_extract_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let parsed: ChatResponse = serde_json::from_value(root).ok()?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// One chat completion. `Ok(None)` on an HTTP or API-level error, which is
/// logged with a body snippet.
pub async fn openai_chat(client: &Client, cfg: &Config, system: &str, user: &str) -> Result<Option<String>> {
    let key = cfg.require_openai_key()?;

    let body = json!({
        "model": cfg.chat_model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
        "temperature": TEMPERATURE,
    });

    let resp = client
        .post(CHAT_ENDPOINT)
        .bearer_auth(key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        logw(format!("OpenAI HTTP {}", status.as_u16()));
        if !raw.is_empty() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("OpenAI raw body: {}", snippet));
        }
        return Ok(None);
    }

    let content = chat_extract_content(&raw);
    if content.is_none() {
        logw("OpenAI response parse failed.".to_string());
    }
    Ok(content)
}

/// Splits a synopsis into cuts. `profile_context` is prepended verbatim
/// (see [`crate::profile::build_profile_context`]).
pub async fn openai_split_cuts(
    client: &Client,
    cfg: &Config,
    synopsis: &str,
    profile_context: &str,
) -> Result<CutList> {
    let synopsis = trim_copy_utf8_safe(synopsis, MAX_SYNOPSIS_BYTES);
    let mut user = String::new();
    if !profile_context.is_empty() {
        user.push_str(profile_context);
        user.push('\n');
    }
    user.push_str("다음 시놉시스를 위 규칙에 맞는 컷 리스트로 분할해줘.\n\n");
    user.push_str(&synopsis);

    let Some(content) = openai_chat(client, cfg, CUT_SPLIT_SYSTEM_PROMPT, &user).await? else {
        return Ok(CutList::default());
    };

    let cuts = CutList::from_gpt_text(&content)?;
    logi(format!("OpenAI cut split received: {} cuts", cuts.items.len()));
    Ok(cuts)
}

/// Asks for a KOR/ENG prompt pair for one scene. The caller extracts the
/// English half with [`crate::prompt::extract_eng_prompt`].
pub async fn openai_refine_prompt(
    client: &Client,
    cfg: &Config,
    scene: &str,
    profile_context: &str,
) -> Result<Option<String>> {
    let scene = trim_copy_utf8_safe(scene, MAX_SYNOPSIS_BYTES);
    let user = if profile_context.is_empty() {
        scene
    } else {
        format!("{}\n{}", profile_context, scene)
    };
    openai_chat(client, cfg, REFINE_SYSTEM_PROMPT, &user).await
}

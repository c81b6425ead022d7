// ==================== AI METADATA GENERATION ====================
// Groq chat-completion glue for the upload form: expanding short
// descriptions, extracting search keywords from a tool's website, and
// pre-filling title/logo from page metadata. All outbound calls carry
// bounded timeouts with distinguished timeout errors.

use crate::utils::error::AppError;
use crate::utils::validators::is_valid_url;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GROQ_MODEL: &str = "llama3-8b-8192";
const GROQ_TIMEOUT: Duration = Duration::from_secs(15);
const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
}

impl GroqConfig {
    pub fn from_env() -> Result<Self, AppError> {
        env::var("GROQ_FORM_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|api_key| Self { api_key })
            .ok_or_else(|| AppError::ConfigError("Groq API key not configured".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn chat_completion(
    http: &reqwest::Client,
    config: &GroqConfig,
    system: &str,
    user: String,
    temperature: f64,
) -> Result<String, AppError> {
    let body = serde_json::json!({
        "model": GROQ_MODEL,
        "messages": [
            ChatMessage { role: "system", content: system.to_string() },
            ChatMessage { role: "user", content: user },
        ],
        "temperature": temperature,
        "max_tokens": 200,
    });

    let response = http
        .post(GROQ_API_URL)
        .bearer_auth(&config.api_key)
        .timeout(GROQ_TIMEOUT)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout("Groq API request took too long".to_string())
            } else {
                AppError::GatewayError(format!("Groq API fetch error: {}", e))
            }
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        log::error!("❌ Groq API error {}: {}", status, detail);
        return Err(AppError::GatewayError(format!("Groq API error: {}", status)));
    }

    let completion: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|e| AppError::GatewayError(format!("Invalid Groq response: {}", e)))?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::GatewayError("No content in Groq response".to_string()))
}

/// Expands a short description into 2-4 sentences for the About section
pub async fn generate_about(http: &reqwest::Client, description: &str) -> Result<String, AppError> {
    if description.len() < 10 {
        return Err(AppError::ValidationError("Description too short".to_string()));
    }
    let config = GroqConfig::from_env()?;

    let about = chat_completion(
        http,
        &config,
        "You are a tool summary generator. Expand the given short description into a more detailed paragraph (about 2-4 sentences) for the 'About' section of a SaaS tool website.",
        description.to_string(),
        0.7,
    )
    .await?;

    log::info!(
        "✨ Generated about text for: {}...",
        description.chars().take(50).collect::<String>()
    );
    Ok(about)
}

// ==================== PAGE FETCH & SIGNAL EXTRACTION ====================

lazy_static! {
    static ref TITLE_RE: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref H1_RE: Regex = Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap();
    static ref META_TAG_RE: Regex = Regex::new(r"(?is)<meta\s+[^>]*>").unwrap();
    static ref META_KEY_RE: Regex =
        Regex::new(r#"(?i)(?:name|property)\s*=\s*["']([^"']+)["']"#).unwrap();
    static ref META_CONTENT_RE: Regex =
        Regex::new(r#"(?i)content\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref TAG_STRIP_RE: Regex = Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref ORIGIN_RE: Regex = Regex::new(r"^(https?://[^/]+)").unwrap();
}

async fn fetch_page(http: &reqwest::Client, website_url: &str) -> Result<String, AppError> {
    let response = http
        .get(website_url)
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .timeout(PAGE_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout("Website took too long to respond".to_string())
            } else {
                AppError::GatewayError(format!("Network error: {}", e))
            }
        })?;

    if !response.status().is_success() {
        let status = response.status();
        log::error!("❌ HTTP {} for {}", status, website_url);
        return Err(AppError::GatewayError(format!(
            "Failed to fetch URL: {}",
            status
        )));
    }

    response
        .text()
        .await
        .map_err(|e| AppError::GatewayError(format!("Failed to read page body: {}", e)))
}

pub(crate) fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

pub(crate) fn extract_meta(html: &str, key: &str) -> Option<String> {
    for tag in META_TAG_RE.find_iter(html) {
        let tag = tag.as_str();
        let matches_key = META_KEY_RE
            .captures(tag)
            .map(|c| c[1].eq_ignore_ascii_case(key))
            .unwrap_or(false);
        if matches_key {
            if let Some(content) = META_CONTENT_RE.captures(tag) {
                let value = decode_entities(content[1].trim());
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

pub(crate) fn extract_first_h1(html: &str) -> Option<String> {
    H1_RE
        .captures(html)
        .map(|c| decode_entities(&WHITESPACE_RE.replace_all(&TAG_STRIP_RE.replace_all(&c[1], " "), " ")))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub(crate) fn body_text(html: &str, max_len: usize) -> String {
    let stripped = TAG_STRIP_RE.replace_all(html, " ");
    let collapsed = WHITESPACE_RE.replace_all(&stripped, " ");
    collapsed.trim().chars().take(max_len).collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

// ==================== KEYWORD EXTRACTION ====================

const KEYWORD_SYSTEM_PROMPT: &str = r#"You are a keyword extractor for AI tools. Extract 5-10 relevant keywords from the website content that users might search for when looking for this AI tool.

RULES:
- Extract exactly 5-10 keywords
- Include "ai" as the first keyword if it's an AI tool
- Focus on what users would search for
- Use common, searchable terms
- Avoid overly specific technical terms
- Return only the keywords array, no other text
- Each keyword should be 1-3 words maximum"#;

/// Tolerant decoding of the model reply: JSON array first, then a bracketed
/// list, then delimiter splitting, then bare words
pub(crate) fn parse_keywords(reply: &str) -> Vec<String> {
    let reply = reply.trim();

    let mut keywords: Vec<String> = if reply.starts_with('[') && reply.ends_with(']') {
        serde_json::from_str::<Vec<String>>(reply).unwrap_or_else(|_| split_bracketed(reply))
    } else if let Some(start) = reply.find('[') {
        match reply[start..].find(']') {
            Some(end) => split_bracketed(&reply[start..start + end + 1]),
            None => split_delimited(reply),
        }
    } else if reply.contains(',') || reply.contains(';') {
        split_delimited(reply)
    } else {
        reply
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect()
    };

    keywords = keywords
        .into_iter()
        .map(|k| k.to_lowercase().trim().to_string())
        .filter(|k| !k.is_empty() && k.len() <= 20)
        .take(10)
        .collect();

    // Pad with generic defaults so the upload form always has 5+
    if keywords.len() < 5 {
        for default in ["ai", "tool", "automation", "productivity", "software"] {
            if keywords.len() >= 5 {
                break;
            }
            if !keywords.iter().any(|k| k == default) {
                keywords.push(default.to_string());
            }
        }
    }

    keywords
}

fn split_bracketed(bracketed: &str) -> Vec<String> {
    bracketed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|k| k.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn split_delimited(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ExtractedKeywords {
    pub keywords: Vec<String>,
}

pub async fn extract_keywords(
    http: &reqwest::Client,
    website_url: &str,
) -> Result<ExtractedKeywords, AppError> {
    if !is_valid_url(website_url) {
        return Err(AppError::ValidationError("Invalid website URL".to_string()));
    }
    let config = GroqConfig::from_env()?;

    let html = fetch_page(http, website_url).await?;
    if html.len() < 100 {
        log::warn!("⚠️  Very short HTML for {}", website_url);
        return Ok(ExtractedKeywords { keywords: vec![] });
    }

    let content = format!(
        "Title: {}\nMeta Description: {}\nOG Description: {}\nH1: {}\nBody Text: {}",
        extract_title(&html).unwrap_or_default(),
        extract_meta(&html, "description").unwrap_or_default(),
        extract_meta(&html, "og:description").unwrap_or_default(),
        extract_first_h1(&html).unwrap_or_default(),
        body_text(&html, 1000),
    );

    let reply = chat_completion(http, &config, KEYWORD_SYSTEM_PROMPT, content, 0.3).await?;
    let keywords = parse_keywords(&reply);

    log::info!("🔑 Extracted keywords for {}: {:?}", website_url, keywords);
    Ok(ExtractedKeywords { keywords })
}

// ==================== METADATA AUTO-FILL ====================

lazy_static! {
    static ref TITLE_SUFFIX_RE: Regex =
        Regex::new(r"(?i)(Free|Official|AI|for .+|Online|App|Website|Platform|Tool|by .+)$")
            .unwrap();
    static ref TRAILING_PUNCT_RE: Regex = Regex::new(r"[\s\-:|·—•]+$").unwrap();
    static ref MULTI_SPACE_RE: Regex = Regex::new(r"\s{2,}").unwrap();
    static ref LOGO_LINK_RE: Regex = Regex::new(
        r#"(?is)<link\s+[^>]*rel\s*=\s*["'](?:icon|shortcut icon|apple-touch-icon)["'][^>]*>"#
    )
    .unwrap();
    static ref HREF_RE: Regex = Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap();
}

/// Trims a page title down to the bare tool name
pub(crate) fn extract_tool_name(title: &str) -> String {
    let mut best = title.trim().to_string();
    for separator in ['|', '-', ':', '·', '—', '•'] {
        if best.contains(separator) {
            let first = best.split(separator).next().unwrap_or("").trim();
            if first.len() >= 3 && first.len() <= 40 {
                best = first.to_string();
            }
        }
    }
    best = TITLE_SUFFIX_RE.replace(&best, "").trim().to_string();
    best = TRAILING_PUNCT_RE.replace(&best, "").trim().to_string();
    MULTI_SPACE_RE.replace_all(&best, " ").into_owned()
}

/// Resolves a possibly relative logo reference against the page URL
pub(crate) fn resolve_logo_url(logo: &str, page_url: &str) -> Option<String> {
    let logo = logo.trim();
    if logo.is_empty() {
        return None;
    }
    if logo.starts_with("http://") || logo.starts_with("https://") {
        return Some(logo.to_string());
    }
    let origin = ORIGIN_RE.captures(page_url)?[1].to_string();
    if let Some(rest) = logo.strip_prefix("//") {
        let scheme = if page_url.starts_with("https") { "https" } else { "http" };
        return Some(format!("{}://{}", scheme, rest));
    }
    if logo.starts_with('/') {
        return Some(format!("{}{}", origin, logo));
    }
    Some(format!("{}/{}", origin, logo))
}

fn find_logo(html: &str, page_url: &str) -> Option<String> {
    if let Some(logo) = extract_meta(html, "og:logo").or_else(|| extract_meta(html, "logo")) {
        return resolve_logo_url(&logo, page_url);
    }

    if let Some(link) = LOGO_LINK_RE.find(html) {
        if let Some(href) = HREF_RE.captures(link.as_str()) {
            return resolve_logo_url(&href[1], page_url);
        }
    }

    // og:image only when the URL itself hints at a logo-sized asset,
    // otherwise it is probably a banner
    if let Some(image) = extract_meta(html, "og:image") {
        let hints = ["logo", "icon", "favicon", "brand", "small", "32", "64", "128"];
        if hints.iter().any(|h| image.contains(h)) {
            return resolve_logo_url(&image, page_url);
        }
    }

    None
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AutoFillMetadata {
    pub title: String,
    pub logo_url: String,
}

pub async fn auto_fill_metadata(
    http: &reqwest::Client,
    website_url: &str,
) -> Result<AutoFillMetadata, AppError> {
    if !is_valid_url(website_url) {
        return Err(AppError::ValidationError("Invalid website URL".to_string()));
    }

    let html = fetch_page(http, website_url).await?;
    if html.len() < 100 {
        log::warn!("⚠️  Very short HTML for {}", website_url);
        return Ok(AutoFillMetadata {
            title: String::new(),
            logo_url: String::new(),
        });
    }

    let raw_title = extract_meta(&html, "og:title")
        .or_else(|| extract_title(&html))
        .unwrap_or_default();
    let title = extract_tool_name(&raw_title);
    let logo_url = find_logo(&html, website_url).unwrap_or_default();

    log::info!("📋 Auto-fill for {}: title='{}' logo='{}'", website_url, title, logo_url);
    Ok(AutoFillMetadata { title, logo_url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_json_array() {
        let reply = r#"["ai", "resume builder", "cv generator", "career tools", "templates"]"#;
        let keywords = parse_keywords(reply);
        assert_eq!(keywords[0], "ai");
        assert_eq!(keywords.len(), 5);
    }

    #[test]
    fn test_parse_keywords_embedded_brackets() {
        let reply = r#"Here are the keywords: ["ai", "coding", "assistant", "developer", "tools", "debugging"]"#;
        let keywords = parse_keywords(reply);
        assert!(keywords.contains(&"coding".to_string()));
        assert!(keywords.len() >= 5);
    }

    #[test]
    fn test_parse_keywords_comma_fallback_pads_defaults() {
        let keywords = parse_keywords("ai, chat");
        assert_eq!(keywords.len(), 5);
        assert!(keywords.contains(&"tool".to_string()));
    }

    #[test]
    fn test_parse_keywords_caps_at_ten_and_lowercases() {
        let reply = (1..=15)
            .map(|i| format!("Keyword{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let keywords = parse_keywords(&reply);
        assert_eq!(keywords.len(), 10);
        assert_eq!(keywords[0], "keyword1");
    }

    #[test]
    fn test_extract_title_and_meta() {
        let html = r#"<html><head>
            <title> Notion AI | Write faster </title>
            <meta name="description" content="An AI assistant.">
            <meta property="og:description" content="Write better with AI.">
        </head><body><h1>Notion <b>AI</b></h1></body></html>"#;

        assert_eq!(extract_title(html).unwrap(), "Notion AI | Write faster");
        assert_eq!(extract_meta(html, "description").unwrap(), "An AI assistant.");
        assert_eq!(
            extract_meta(html, "og:description").unwrap(),
            "Write better with AI."
        );
        assert_eq!(extract_first_h1(html).unwrap(), "Notion AI");
    }

    #[test]
    fn test_body_text_strips_markup() {
        let html = "<body><script>var x = 1;</script><p>Hello   <b>world</b></p></body>";
        assert_eq!(body_text(html, 100), "Hello world");
    }

    #[test]
    fn test_extract_tool_name_trims_marketing_title() {
        assert_eq!(
            extract_tool_name("Midjourney | AI Art Generator"),
            "Midjourney"
        );
        assert_eq!(extract_tool_name("Cursor - The AI Code Editor"), "Cursor");
        assert_eq!(extract_tool_name("Claude"), "Claude");
    }

    #[test]
    fn test_resolve_logo_url() {
        assert_eq!(
            resolve_logo_url("/favicon.ico", "https://example.com/page").unwrap(),
            "https://example.com/favicon.ico"
        );
        assert_eq!(
            resolve_logo_url("https://cdn.example.com/logo.png", "https://example.com").unwrap(),
            "https://cdn.example.com/logo.png"
        );
        assert_eq!(
            resolve_logo_url("//cdn.example.com/logo.png", "https://example.com").unwrap(),
            "https://cdn.example.com/logo.png"
        );
        assert!(resolve_logo_url("", "https://example.com").is_none());
    }

    #[test]
    fn test_find_logo_prefers_meta_then_link() {
        let html = r#"<head>
            <link rel="icon" href="/favicon.ico">
            <meta property="og:image" content="https://example.com/banner-large.jpg">
        </head>"#;
        assert_eq!(
            find_logo(html, "https://example.com").unwrap(),
            "https://example.com/favicon.ico"
        );

        let banner_only = r#"<head><meta property="og:image" content="https://example.com/banner.jpg"></head>"#;
        assert!(find_logo(banner_only, "https://example.com").is_none());

        let logo_image = r#"<head><meta property="og:image" content="https://example.com/logo-64.png"></head>"#;
        assert_eq!(
            find_logo(logo_image, "https://example.com").unwrap(),
            "https://example.com/logo-64.png"
        );
    }
}

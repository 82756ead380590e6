//! Source URL normalization and public URL building.

use url::Url;

/// Normalize a caller-supplied video URL.
///
/// Stray backticks (seen when URLs are pasted out of chat clients) and
/// surrounding whitespace are stripped; anything that does not then start
/// with `http://` or `https://` is rejected.
pub fn normalize_video_url(raw: &str) -> Option<String> {
    let trimmed = raw.replace('`', "");
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Build the externally visible URL for a stored artifact.
///
/// With no configured base the raw storage key is returned as-is.
pub fn build_public_url(base: Option<&str>, key: &str) -> String {
    match base {
        Some(base) if !base.is_empty() => {
            let base = base.trim_end_matches('/');
            let key = key.trim_start_matches('/');
            format!("{}/{}", base, key)
        }
        _ => key.to_string(),
    }
}

/// Derive the co-located storage key from a source video URL.
///
/// The key is the URL path with leading slashes removed, matching how
/// upload URLs for the same bucket are formed.
pub fn video_key_from_url(video_url: &str) -> Option<String> {
    let parsed = Url::parse(video_url).ok()?;
    let key = parsed.path().trim_start_matches('/');
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

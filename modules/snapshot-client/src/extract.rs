//! Image URL extraction from rendered ad snapshot markup.
//!
//! The snapshot embeds JSON-ish fields such as
//! `"original_image_url":"https:\/\/scontent...jpg"`. Video ads also carry
//! `video_preview_image_url`, which wins when both are present.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

pub const IMAGE_URL_FIELD: &str = "original_image_url";
pub const VIDEO_PREVIEW_IMAGE_URL_FIELD: &str = "video_preview_image_url";

static IMAGE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| field_regex(IMAGE_URL_FIELD).expect("valid regex"));
static VIDEO_PREVIEW_IMAGE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| field_regex(VIDEO_PREVIEW_IMAGE_URL_FIELD).expect("valid regex"));

fn field_regex(field: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r#""{field}":\s*?"(http[^"]+?)""#))
}

struct Marker {
    field: &'static str,
    null_phrase: String,
    regex: &'static Regex,
}

impl Marker {
    /// Field name present and not explicitly `null`.
    fn present_in(&self, body: &str) -> bool {
        body.contains(self.field) && !body.contains(&self.null_phrase)
    }
}

fn markers() -> [Marker; 2] {
    [
        Marker {
            field: VIDEO_PREVIEW_IMAGE_URL_FIELD,
            null_phrase: format!("\"{VIDEO_PREVIEW_IMAGE_URL_FIELD}\":null"),
            regex: &VIDEO_PREVIEW_IMAGE_URL_RE,
        },
        Marker {
            field: IMAGE_URL_FIELD,
            null_phrase: format!("\"{IMAGE_URL_FIELD}\":null"),
            regex: &IMAGE_URL_RE,
        },
    ]
}

/// Find the ad's image URL in a snapshot body.
///
/// Returns `None` when no marker is present, every present marker is `null`,
/// or a marker is present in a shape the pattern does not recognise.
pub fn extract_image_url(body: &str) -> Option<String> {
    for marker in markers() {
        if !marker.present_in(body) {
            continue;
        }
        debug!(field = marker.field, "Marker found in snapshot");
        if let Some(url) = search_by_regex(marker.regex, body) {
            return Some(url);
        }
        info!(
            field = marker.field,
            regex = marker.regex.as_str(),
            "Marker present in snapshot but pattern did not match"
        );
    }

    warn!(
        "Expected field not found in ad snapshot: ({} OR {})",
        IMAGE_URL_FIELD, VIDEO_PREVIEW_IMAGE_URL_FIELD
    );
    None
}

fn search_by_regex(re: &Regex, body: &str) -> Option<String> {
    let caps = re.captures(body)?;
    let raw = &caps[1];
    debug!(raw, "Found raw image URL value in snapshot");
    Some(unescape_url(raw))
}

/// Strip JSON backslash escaping (`https:\/\/` → `https://`).
pub fn unescape_url(raw: &str) -> String {
    raw.replace('\\', "")
}

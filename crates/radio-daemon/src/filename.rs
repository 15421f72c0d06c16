//! Recording file names: `{station}-{YYYY-MM-DD-HH-MM-SS}.{ext}`.

use chrono::NaiveDateTime;

/// Longest station part of a file name.
pub const MAX_NAME_LEN: usize = 64;
/// Used when nothing of the station name survives sanitising.
pub const PLACEHOLDER_NAME: &str = "recording";
pub const DEFAULT_EXTENSION: &str = "mp3";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Build the output file name for a recording started at `now`.  Pure: the
/// same inputs always give the same name.
pub fn generate(station_name: &str, codec: &str, now: NaiveDateTime) -> String {
    format!(
        "{}-{}.{}",
        sanitize_name(station_name),
        now.format(TIMESTAMP_FORMAT),
        extension_for(codec)
    )
}

fn is_trim_char(c: char) -> bool {
    c == '_' || c == '-'
}

fn sanitize_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars().filter(char::is_ascii) {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_whitespace() {
            if !in_whitespace {
                cleaned.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || is_trim_char(c) {
            cleaned.push(c);
        }
    }

    let mut collapsed = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    // Only ASCII is left, so byte truncation cannot split a character.
    let trimmed = collapsed.trim_matches(is_trim_char);
    let truncated = trimmed[..trimmed.len().min(MAX_NAME_LEN)].trim_matches(is_trim_char);

    if truncated.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        truncated.to_string()
    }
}

/// File extension for a directory codec label.
pub fn extension_for(codec: &str) -> String {
    let codec = codec.trim().to_ascii_lowercase();
    let ext = match codec.as_str() {
        "mp3" | "mpeg" | "mpeg audio" | "mpga" => "mp3",
        "aac" | "aac+" | "aacp" | "he-aac" | "he-aacv2" | "heaac" | "aac-lc" => "aac",
        "ogg" | "vorbis" => "ogg",
        "opus" => "opus",
        "flac" => "flac",
        other
            if (2..=5).contains(&other.len())
                && other.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            other
        }
        _ => DEFAULT_EXTENSION,
    };
    ext.to_string()
}

//! Normalization of the stored `image_url`/`video_url` fields.
//!
//! Upstream rows hold media in three shapes: a bare URL, a JSON array encoded
//! as a string, or a comma separated list. Everything that renders media goes
//! through [`normalize`] so the sniffing lives in one place.

use serde::{Deserialize, Serialize};

use crate::navigation::GalleryCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
    Gallery,
}

impl MediaKind {
    pub fn from_media_type(media_type: Option<&str>) -> Self {
        match media_type.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "video" || value == "reel" => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Gallery => "gallery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub urls: Vec<String>,
}

impl MediaRef {
    fn from_urls(urls: Vec<String>, declared: MediaKind) -> Self {
        let kind = if urls.len() > 1 {
            MediaKind::Gallery
        } else if declared == MediaKind::Gallery {
            MediaKind::Image
        } else {
            declared
        };
        MediaRef { kind, urls }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn cursor(&self) -> Option<GalleryCursor> {
        GalleryCursor::new(self.urls.len()).ok()
    }
}

/// How a raw media field was recognised, in fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMediaField<'a> {
    Empty,
    JsonList(Vec<String>),
    CommaList(Vec<&'a str>),
    Single(&'a str),
}

impl<'a> RawMediaField<'a> {
    pub fn parse(raw: Option<&'a str>) -> Self {
        let trimmed = match raw.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => return RawMediaField::Empty,
        };

        let bracketed = trimmed.starts_with('[') && trimmed.ends_with(']');
        if bracketed {
            match parse_json_list(trimmed) {
                Some(list) if list.is_empty() => return RawMediaField::Empty,
                Some(list) => return RawMediaField::JsonList(list),
                None => {}
            }
            tracing::debug!(raw = trimmed, "media field looked like JSON but did not parse");
        }

        if trimmed.contains(',') {
            let segments = split_segments(trimmed, trimmed.starts_with('['));
            if segments.is_empty() {
                return RawMediaField::Empty;
            }
            return RawMediaField::CommaList(segments);
        }

        RawMediaField::Single(trimmed)
    }

    pub fn into_media(self, declared: MediaKind) -> MediaRef {
        match self {
            RawMediaField::Empty => MediaRef {
                kind: MediaKind::Image,
                urls: Vec::new(),
            },
            RawMediaField::JsonList(urls) => MediaRef::from_urls(urls, declared),
            RawMediaField::CommaList(segments) => MediaRef::from_urls(
                segments.into_iter().map(str::to_string).collect(),
                declared,
            ),
            RawMediaField::Single(url) => MediaRef::from_urls(vec![url.to_string()], declared),
        }
    }
}

pub fn normalize(raw: Option<&str>) -> MediaRef {
    normalize_as(raw, MediaKind::Image)
}

pub fn normalize_as(raw: Option<&str>, declared: MediaKind) -> MediaRef {
    RawMediaField::parse(raw).into_media(declared)
}

fn parse_json_list(raw: &str) -> Option<Vec<String>> {
    let parsed: Vec<String> = serde_json::from_str(raw).ok()?;
    Some(
        parsed
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect(),
    )
}

fn split_segments(raw: &str, strip_json_noise: bool) -> Vec<&str> {
    raw.split(',')
        .map(|segment| {
            let segment = segment.trim();
            if strip_json_noise {
                segment
                    .trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '\'')
                    .trim()
            } else {
                segment
            }
        })
        .filter(|segment| !segment.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_fields_have_no_urls() {
        assert!(normalize(None).urls.is_empty());
        assert!(normalize(Some("")).urls.is_empty());
        assert!(normalize(Some("   ")).urls.is_empty());
        assert_eq!(normalize(None).kind, MediaKind::Image);
    }

    #[test]
    fn json_array_becomes_gallery_in_order() {
        let media = normalize(Some(r#"["https://a/1.jpg", "https://a/2.jpg", "https://a/3.jpg"]"#));
        assert_eq!(media.kind, MediaKind::Gallery);
        assert_eq!(
            media.urls,
            vec!["https://a/1.jpg", "https://a/2.jpg", "https://a/3.jpg"]
        );
    }

    #[test]
    fn single_entry_json_array_keeps_declared_kind() {
        let media = normalize_as(Some(r#"["https://a/clip.mp4"]"#), MediaKind::Video);
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.urls, vec!["https://a/clip.mp4"]);
    }

    #[test]
    fn comma_list_is_split_and_trimmed() {
        let media = normalize(Some(" https://a/1.jpg , ,https://a/2.jpg,"));
        assert_eq!(media.kind, MediaKind::Gallery);
        assert_eq!(media.urls, vec!["https://a/1.jpg", "https://a/2.jpg"]);
    }

    #[test]
    fn comma_list_with_one_survivor_is_an_image() {
        let media = normalize(Some("https://a/1.jpg, ,"));
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.urls, vec!["https://a/1.jpg"]);
    }

    #[test]
    fn malformed_brackets_degrade_to_comma_split() {
        let media = normalize(Some(r#"["https://a/1.jpg", https://a/2.jpg]"#));
        assert_eq!(media.kind, MediaKind::Gallery);
        assert_eq!(media.urls, vec!["https://a/1.jpg", "https://a/2.jpg"]);
    }

    #[test]
    fn truncated_json_list_still_yields_urls() {
        let media = normalize(Some(r#"["https://a/1.jpg","https://a/2.jpg"#));
        assert_eq!(media.kind, MediaKind::Gallery);
        assert_eq!(media.urls, vec!["https://a/1.jpg", "https://a/2.jpg"]);
    }

    #[test]
    fn only_commas_is_empty() {
        assert!(normalize(Some(",,,")).is_empty());
        assert_eq!(RawMediaField::parse(Some(" , , ")), RawMediaField::Empty);
    }

    #[test]
    fn malformed_brackets_without_commas_stay_single() {
        let media = normalize(Some("[not json]"));
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.urls, vec!["[not json]"]);
    }

    #[test]
    fn empty_json_array_has_no_urls() {
        assert!(normalize(Some("[]")).is_empty());
        assert!(normalize(Some(r#"["", "  "]"#)).is_empty());
    }

    #[test]
    fn plain_url_is_single() {
        let media = normalize_as(Some("https://res.cloudinary.com/x/video.mp4"), MediaKind::Video);
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.first(), Some("https://res.cloudinary.com/x/video.mp4"));
        assert_eq!(media.cursor().map(|c| c.item_count()), Some(1));
    }

    #[test]
    fn media_type_column_maps_to_kind() {
        assert_eq!(MediaKind::from_media_type(Some("VIDEO")), MediaKind::Video);
        assert_eq!(MediaKind::from_media_type(Some("reel")), MediaKind::Video);
        assert_eq!(MediaKind::from_media_type(Some("image")), MediaKind::Image);
        assert_eq!(MediaKind::from_media_type(None), MediaKind::Image);
    }
}

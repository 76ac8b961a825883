//! WordPress content model and the text helpers used to present it.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Rendered {
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: u64,
    pub date: String,
    pub slug: String,
    pub title: Rendered,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    #[serde(default)]
    pub featured_media: u64,
    #[serde(default)]
    pub categories: Vec<u64>,
    #[serde(default)]
    pub author: u64,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<Embedded>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Embedded {
    #[serde(rename = "wp:featuredmedia", default, skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<Vec<FeaturedMedia>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<EmbeddedAuthor>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FeaturedMedia {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub alt_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EmbeddedAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// Entry of the navigation bar.  `id` 0 is the unfiltered home feed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryItem {
    pub id: u64,
    pub name: &'static str,
    pub slug: &'static str,
    pub color: &'static str,
}

pub const NAV_CATEGORIES: &[CategoryItem] = &[
    CategoryItem { id: 0, name: "Home", slug: "home", color: "#1a1a2e" },
    CategoryItem { id: 1, name: "Featured", slug: "featured", color: "#e94560" },
    CategoryItem { id: 2, name: "News", slug: "news", color: "#0f3460" },
    CategoryItem { id: 3, name: "Creative", slug: "creative", color: "#e94560" },
    CategoryItem { id: 4, name: "Travel", slug: "travel", color: "#16c79a" },
    CategoryItem { id: 5, name: "Tech", slug: "tech", color: "#11999e" },
    CategoryItem { id: 6, name: "Fashion", slug: "fashion", color: "#f64c72" },
    CategoryItem { id: 7, name: "Food", slug: "food", color: "#fcbad3" },
    CategoryItem { id: 8, name: "Sports", slug: "sports", color: "#00b8a9" },
    CategoryItem { id: 9, name: "Music", slug: "music", color: "#845ec2" },
    CategoryItem { id: 10, name: "Shop", slug: "shop", color: "#ffc75f" },
];

pub fn featured_image(post: &Post) -> Option<&str> {
    post.embedded
        .as_ref()?
        .featured_media
        .as_ref()?
        .first()?
        .source_url
        .as_deref()
        .filter(|url| !url.is_empty())
}

pub fn author_name(post: &Post) -> &str {
    post.embedded
        .as_ref()
        .and_then(|e| e.author.as_ref())
        .and_then(|a| a.first())
        .and_then(|a| a.name.as_deref())
        .filter(|name| !name.is_empty())
        .unwrap_or("Unknown")
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn numeric_entity_regex() -> &'static Regex {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    ENTITY.get_or_init(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static regex"))
}

/// Drop HTML tags and decode the entities WordPress emits in rendered fields.
pub fn strip_html(html: &str) -> String {
    let text = tag_regex().replace_all(html, "");
    let text = numeric_entity_regex().replace_all(&text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&hellip;", "…")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Plain-text teaser: stripped, cut to `max_chars` characters, then "...".
pub fn excerpt(html: &str, max_chars: usize) -> String {
    let text = strip_html(html);
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// "2024-01-05T10:30:00" → "Jan 5, 2024".  Unparseable input is returned as is.
pub fn format_date(date: &str) -> String {
    let parsed = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d"));
    match parsed {
        Ok(d) => d.format("%b %-d, %Y").to_string(),
        Err(_) => date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        serde_json::from_value(serde_json::json!({
            "id": 7,
            "date": "2024-01-05T10:30:00",
            "slug": "hello",
            "title": { "rendered": "Hello &amp; <em>welcome</em>" },
            "content": { "rendered": "<p>Body</p>" },
            "excerpt": { "rendered": "<p>Short</p>" },
            "featured_media": 12,
            "categories": [2, 5],
            "author": 3,
            "link": "https://kaiga.online/hello",
            "_embedded": {
                "wp:featuredmedia": [{ "source_url": "https://img/1.jpg", "alt_text": "" }],
                "author": [{ "name": "Amina" }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_embedded_helpers() {
        let post = sample_post();
        assert_eq!(featured_image(&post), Some("https://img/1.jpg"));
        assert_eq!(author_name(&post), "Amina");
        assert_eq!(post.categories, vec![2, 5]);
    }

    #[test]
    fn test_helpers_without_embed() {
        let mut post = sample_post();
        post.embedded = None;
        assert_eq!(featured_image(&post), None);
        assert_eq!(author_name(&post), "Unknown");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("Hello &amp; <em>welcome</em>"), "Hello & welcome");
        assert_eq!(strip_html("It&#8217;s <b>live</b>"), "It\u{2019}s live");
        assert_eq!(strip_html("&#x41;&lt;"), "A<");
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_excerpt_truncates_by_chars() {
        assert_eq!(excerpt("<p>abcdef</p>", 3), "abc...");
        assert_eq!(excerpt("<p>ab</p>", 10), "ab...");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-01-05T10:30:00"), "Jan 5, 2024");
        assert_eq!(format_date("2023-11-20"), "Nov 20, 2023");
        assert_eq!(format_date("not a date"), "not a date");
    }

    #[test]
    fn test_nav_starts_with_home() {
        assert_eq!(NAV_CATEGORIES[0].slug, "home");
        assert_eq!(NAV_CATEGORIES.len(), 11);
    }
}

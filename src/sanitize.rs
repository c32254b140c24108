use std::collections::{HashMap, HashSet};

/// Tags that survive sanitization for every article.
pub const BASELINE_TAGS: &[&str] = &[
    "address", "article", "aside", "footer", "header", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "main", "nav", "section", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "hr", "li", "ol", "p", "pre", "ul", "a", "abbr", "b", "bdi", "bdo", "br", "cite",
    "code", "data", "dfn", "em", "i", "kbd", "mark", "q", "rb", "rp", "rt", "rtc", "ruby", "s",
    "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var", "wbr", "caption", "col",
    "colgroup", "table", "tbody", "td", "tfoot", "th", "thead", "tr",
];

const IMAGE_TAG: &str = "img";
const ANCHOR_ATTRIBUTES: &[&str] = &["href", "name", "target"];
const IMAGE_ATTRIBUTES: &[&str] = &["src", "srcset", "alt", "title", "width", "height", "loading"];

/// Strips every tag and attribute outside the allow-list. Malformed markup
/// degrades to whatever the HTML parser recovers; this never fails.
pub fn sanitize(raw_html: &str, allow_images: bool) -> String {
    let mut builder = ammonia::Builder::default();
    builder
        .tags(allowed_tags(allow_images))
        .tag_attributes(allowed_attributes(allow_images));
    builder.clean(raw_html).to_string()
}

/// Allow-list for a single call; the baseline is never modified.
pub fn allowed_tags(allow_images: bool) -> HashSet<&'static str> {
    let mut tags = BASELINE_TAGS.iter().copied().collect::<HashSet<_>>();
    if allow_images {
        tags.insert(IMAGE_TAG);
    }
    tags
}

fn allowed_attributes(allow_images: bool) -> HashMap<&'static str, HashSet<&'static str>> {
    let mut attributes = HashMap::new();
    attributes.insert("a", ANCHOR_ATTRIBUTES.iter().copied().collect());
    if allow_images {
        attributes.insert(IMAGE_TAG, IMAGE_ATTRIBUTES.iter().copied().collect());
    }
    attributes
}

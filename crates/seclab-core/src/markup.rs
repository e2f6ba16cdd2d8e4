//! Write-time validation of content bodies.
//!
//! Bodies are stored exactly as submitted and rendered without further
//! sanitizing, so everything is decided here. The check is an allow-list
//! scan over the markup: every tag and every attribute must be listed,
//! link targets must use a safe scheme, and images must point under the
//! configured asset base. Anything the scanner cannot read is rejected.

use crate::error::MarkupError;

/// Largest accepted body, in bytes.
pub const DEFAULT_MAX_BODY_LEN: usize = 256 * 1024;

const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "caption", "code", "dd", "div", "dl", "dt", "em", "h1",
    "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "kbd", "li", "ol", "p", "pre", "s", "samp",
    "span", "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "u",
    "ul",
];

const GLOBAL_ATTRS: &[&str] = &["class", "id", "title", "lang"];

fn tag_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "rel", "target"],
        "img" => &["src", "alt", "width", "height"],
        "td" | "th" => &["colspan", "rowspan", "scope"],
        "ol" => &["start", "type"],
        _ => &[],
    }
}

/// Allow-list policy for content bodies.
#[derive(Debug, Clone)]
pub struct MarkupPolicy {
    max_len: usize,
    asset_base: Option<String>,
}

impl Default for MarkupPolicy {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_BODY_LEN,
            asset_base: None,
        }
    }
}

impl MarkupPolicy {
    /// A policy whose `<img src>` must start with `asset_base` (or be a
    /// site-relative path).
    #[must_use]
    pub fn with_asset_base(asset_base: impl Into<String>) -> Self {
        Self {
            asset_base: Some(asset_base.into()),
            ..Self::default()
        }
    }

    /// Override the size limit.
    #[must_use]
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Validate `body` against the policy.
    ///
    /// # Errors
    ///
    /// The first [`MarkupError`] encountered.
    pub fn validate(&self, body: &str) -> Result<(), MarkupError> {
        if body.len() > self.max_len {
            return Err(MarkupError::TooLarge {
                len: body.len(),
                limit: self.max_len,
            });
        }

        let bytes = body.as_bytes();
        let mut pos = 0;
        while let Some(offset) = find_lt(&bytes[pos..]) {
            let start = pos + offset;
            let rest = &body[start..];

            pos = if rest.starts_with("<!--") {
                comment_end(body, start)?
            } else if rest.starts_with("</") {
                closing_tag(body, start)?
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                return Err(MarkupError::Tag {
                    tag: rest[1..2].to_owned(),
                });
            } else if rest.as_bytes().get(1).is_some_and(u8::is_ascii_alphabetic) {
                self.opening_tag(body, start)?
            } else {
                // A bare `<` in text.
                start + 1
            };
        }
        Ok(())
    }

    fn opening_tag(&self, body: &str, start: usize) -> Result<usize, MarkupError> {
        let bytes = body.as_bytes();
        let unterminated = MarkupError::Malformed {
            offset: start,
            reason: "unterminated tag",
        };

        let name_start = start + 1;
        let name_end = scan(bytes, name_start, u8::is_ascii_alphanumeric);
        let tag = body[name_start..name_end].to_ascii_lowercase();
        check_tag(&tag)?;

        let mut pos = name_end;
        loop {
            pos = scan(bytes, pos, u8::is_ascii_whitespace);
            match bytes.get(pos) {
                None => return Err(unterminated),
                Some(b'>') => return Ok(pos + 1),
                Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => return Ok(pos + 2),
                Some(_) => {}
            }

            let attr_start = pos;
            pos = scan(bytes, pos, |b| {
                !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'')
            });
            if pos == attr_start {
                return Err(MarkupError::Malformed {
                    offset: pos,
                    reason: "unexpected character in tag",
                });
            }
            let attr = body[attr_start..pos].to_ascii_lowercase();
            if !GLOBAL_ATTRS.contains(&attr.as_str()) && !tag_attrs(&tag).contains(&attr.as_str()) {
                return Err(MarkupError::Attribute { tag, attr });
            }

            pos = scan(bytes, pos, u8::is_ascii_whitespace);
            let value = if bytes.get(pos) == Some(&b'=') {
                pos = scan(bytes, pos + 1, u8::is_ascii_whitespace);
                match bytes.get(pos) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let value_start = pos + 1;
                        let len = body[value_start..]
                            .find(char::from(quote))
                            .ok_or(MarkupError::Malformed {
                                offset: pos,
                                reason: "unterminated attribute value",
                            })?;
                        pos = value_start + len + 1;
                        &body[value_start..value_start + len]
                    }
                    Some(_) => {
                        let value_start = pos;
                        pos = scan(bytes, pos, |b| !b.is_ascii_whitespace() && *b != b'>');
                        &body[value_start..pos]
                    }
                    None => return Err(unterminated),
                }
            } else {
                ""
            };

            let url_ok = match attr.as_str() {
                "href" => is_safe_link(value),
                "src" => self.is_asset(value),
                _ => true,
            };
            if !url_ok {
                return Err(MarkupError::Url { tag, attr });
            }
        }
    }

    fn is_asset(&self, url: &str) -> bool {
        let url = url.trim();
        if url.contains('\\') || has_encoded_scheme(url) {
            return false;
        }
        if url.starts_with('/') && !url.starts_with("//") {
            return true;
        }
        self.asset_base
            .as_deref()
            .is_some_and(|base| url.starts_with(base))
    }
}

fn closing_tag(body: &str, start: usize) -> Result<usize, MarkupError> {
    let bytes = body.as_bytes();
    let name_start = start + 2;
    let name_end = scan(bytes, name_start, u8::is_ascii_alphanumeric);
    let tag = body[name_start..name_end].to_ascii_lowercase();
    check_tag(&tag)?;

    let close = scan(bytes, name_end, u8::is_ascii_whitespace);
    match bytes.get(close) {
        Some(b'>') => Ok(close + 1),
        _ => Err(MarkupError::Malformed {
            offset: start,
            reason: "unterminated closing tag",
        }),
    }
}

/// End of the comment opened at `start`. Browsers also close comments at
/// `<!-->`, `<!--->` and `--!>`, so those forms are refused rather than
/// skipped over.
fn comment_end(body: &str, start: usize) -> Result<usize, MarkupError> {
    let inner = &body[start + 4..];
    if inner.starts_with('>') || inner.starts_with("->") {
        return Err(MarkupError::Malformed {
            offset: start,
            reason: "empty comment closes early",
        });
    }
    let end = inner.find("-->").ok_or(MarkupError::Malformed {
        offset: start,
        reason: "unterminated comment",
    })?;
    if inner[..end + 3].contains("--!>") {
        return Err(MarkupError::Malformed {
            offset: start,
            reason: "comment closed with --!>",
        });
    }
    Ok(start + 4 + end + 3)
}

fn check_tag(tag: &str) -> Result<(), MarkupError> {
    if ALLOWED_TAGS.contains(&tag) {
        Ok(())
    } else {
        Err(MarkupError::Tag { tag: tag.to_owned() })
    }
}

fn find_lt(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|b| *b == b'<')
}

fn scan(bytes: &[u8], from: usize, pred: impl Fn(&u8) -> bool) -> usize {
    bytes
        .get(from..)
        .and_then(|tail| tail.iter().position(|b| !pred(b)))
        .map_or(bytes.len(), |n| from + n)
}

/// Entity or percent escapes before the first path separator can smuggle
/// a scheme past [`is_safe_link`].
fn has_encoded_scheme(url: &str) -> bool {
    url.split(['/', '?', '#'])
        .next()
        .is_some_and(|head| head.contains(['&', '%']))
}

/// Relative links, fragments, and http/https/mailto only.
fn is_safe_link(url: &str) -> bool {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.contains('\\') || has_encoded_scheme(&cleaned) {
        return false;
    }
    let scheme_end = cleaned.find([':', '/', '?', '#']);
    match scheme_end {
        Some(i) if cleaned.as_bytes()[i] == b':' => {
            matches!(&cleaned[..i], "http" | "https" | "mailto")
        }
        _ => true,
    }
}

//! Whitelist sanitizer for caption markup.
//!
//! Caption text can come straight from an LLM response and is later
//! rendered as structured markup, so everything outside a small inline
//! whitelist is neutralized here. Allowed tags: `b`, `i`, `small`, `br`
//! (with `strong`, `em` and `<br/>` canonicalized onto them). Attributes
//! are always dropped; unknown tags are removed while their contents stay
//! as text; malformed markup is kept as literal text.

/// Canonical tag for a (lowercased) tag name, or `None` when the tag is
/// not whitelisted.
fn canonical_tag(name: &str) -> Option<&'static str> {
    match name {
        "b" | "strong" => Some("b"),
        "i" | "em" => Some("i"),
        "small" => Some("small"),
        "br" => Some("br"),
        _ => None,
    }
}

struct ParsedTag {
    name: String,
    closing: bool,
    end: usize,
}

/// Parses a tag starting at `chars[start] == '<'`. Returns `None` when the
/// text is not a tag (no name, another `<` before `>`, or unterminated),
/// in which case the `<` is treated as literal text.
fn parse_tag(chars: &[char], start: usize) -> Option<ParsedTag> {
    let mut i = start + 1;
    let mut closing = false;
    if chars.get(i) == Some(&'/') {
        closing = true;
        i += 1;
    }
    let name_start = i;
    while i < chars.len() && chars[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let name: String = chars[name_start..i]
        .iter()
        .collect::<String>()
        .to_ascii_lowercase();
    while i < chars.len() {
        match chars[i] {
            '>' => {
                return Some(ParsedTag {
                    name,
                    closing,
                    end: i + 1,
                });
            }
            '<' => return None,
            _ => i += 1,
        }
    }
    None
}

/// Restricts `raw` to whitelisted inline tags. Idempotent:
/// `sanitize(sanitize(s)) == sanitize(s)`.
pub fn sanitize(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch != '<' {
            out.push(ch);
            i += 1;
            continue;
        }
        let Some(tag) = parse_tag(&chars, i) else {
            out.push('<');
            i += 1;
            continue;
        };
        match canonical_tag(&tag.name) {
            Some("br") => {
                if !tag.closing {
                    out.push_str("<br>");
                }
            }
            Some(name) => {
                if tag.closing {
                    out.push_str("</");
                } else {
                    out.push('<');
                }
                out.push_str(name);
                out.push('>');
            }
            None => {}
        }
        i = tag.end;
    }
    out
}

/// A caption split into its rendered lines: a bold title and an optional
/// small second line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLines {
    pub title: String,
    pub small: Option<String>,
}

/// Splits sanitized caption markup into the title line and the optional
/// `<small>` second line, with markup stripped from both.
pub fn caption_lines(sanitized: &str) -> CaptionLines {
    let Some(idx) = sanitized.find("<small>") else {
        return CaptionLines {
            title: strip_markup(sanitized),
            small: None,
        };
    };
    let title_part = &sanitized[..idx];
    let rest = &sanitized[idx + "<small>".len()..];
    let small_part = match rest.find("</small>") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let small = strip_markup(small_part);
    CaptionLines {
        title: strip_markup(title_part),
        small: if small.is_empty() { None } else { Some(small) },
    }
}

/// Removes whitelisted tags from sanitized text, turning `<br>` into a
/// space, and collapses the remaining whitespace.
pub fn strip_markup(sanitized: &str) -> String {
    let chars: Vec<char> = sanitized.chars().collect();
    let mut out = String::with_capacity(sanitized.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch != '<' {
            out.push(ch);
            i += 1;
            continue;
        }
        let Some(tag) = parse_tag(&chars, i) else {
            out.push('<');
            i += 1;
            continue;
        };
        match canonical_tag(&tag.name) {
            Some("br") => out.push(' '),
            Some(_) => {}
            None => {}
        }
        i = tag.end;
    }
    collapse_whitespace(out.trim())
}

fn collapse_whitespace(value: &str) -> String {
    let mut out = String::new();
    let mut last_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags_and_attributes() {
        let out = sanitize("<script src=\"x\">alert(1)</script><b onclick=\"evil()\">hi</b>");
        assert!(!out.contains("script"));
        assert!(!out.contains("onclick"));
        assert_eq!(out, "alert(1)<b>hi</b>");
    }

    #[test]
    fn strips_img_with_event_handler() {
        let out = sanitize("before<img src=x onerror=alert(1)>after");
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn canonicalizes_aliases() {
        assert_eq!(
            sanitize("<STRONG>a</STRONG><EM>b</EM><BR/>"),
            "<b>a</b><i>b</i><br>"
        );
    }

    #[test]
    fn keeps_malformed_markup_as_text() {
        assert_eq!(sanitize("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
        assert_eq!(sanitize("<b>unclosed"), "<b>unclosed");
        assert_eq!(sanitize("trailing <"), "trailing <");
        assert_eq!(sanitize("<scr<b>x</b>"), "<scr<b>x</b>");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let cases = [
            "<script>alert(1)</script>",
            "<b class=\"x\">Sunset</b><br><small>May</small>",
            "1 < 2 <unknown>keep</unknown>",
            "<scr<b>x</b>",
            "plain text",
            "<br/><BR><br >",
        ];
        for case in cases {
            let once = sanitize(case);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", case);
        }
    }

    #[test]
    fn splits_title_and_small_line() {
        let lines = caption_lines("<b>Sunset</b> glow<br><small>12 May · Lisbon</small>");
        assert_eq!(lines.title, "Sunset glow");
        assert_eq!(lines.small.as_deref(), Some("12 May · Lisbon"));
    }

    #[test]
    fn title_only_when_no_small_line() {
        let lines = caption_lines("<b>Sunset</b>");
        assert_eq!(lines.title, "Sunset");
        assert_eq!(lines.small, None);
    }

    #[test]
    fn empty_small_line_is_dropped() {
        let lines = caption_lines("Sunset<small>  </small>");
        assert_eq!(lines.title, "Sunset");
        assert_eq!(lines.small, None);
    }

    #[test]
    fn strip_markup_collapses_breaks() {
        assert_eq!(strip_markup("a<br><br>b  c"), "a b c");
    }
}

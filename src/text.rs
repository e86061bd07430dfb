//! HTML → plain text → lines.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use tracing::trace;

/// Elements whose contents are never visible text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that end a line of visible text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "td", "th", "title", "tr", "ul",
];

pub const URL_TOKEN: &str = "<URL>";
pub const EMAIL_TOKEN: &str = "<EMAIL>";
pub const PHONE_TOKEN: &str = "<PHONE>";
pub const CURRENCY_TOKEN: &str = "<CUR>";

const MAX_SANITIZE_PASSES: usize = 16;

static INVISIBLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Cc}\p{Cf}\u{FFFD}--[\n\t]]").expect("invisible regex"));
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Sc}").expect("currency regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|ftp://|www\.)[^\s<>"']*[^\s<>"'.,;:!?)\]]"#)
        .expect("url regex")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b")
        .expect("email regex")
});
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)[ .-]?|\b\d{3}[ .-])\d{3}[ .-]\d{4}\b")
        .expect("phone regex")
});
static HSPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("space regex"));
static LINEBREAKS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("newline regex"));

/// Which entities [`sanitize_with`] swaps for placeholder tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub urls: bool,
    pub emails: bool,
    pub phone_numbers: bool,
    pub currency_symbols: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            urls: true,
            emails: true,
            phone_numbers: true,
            currency_symbols: true,
        }
    }
}

/// Visible text of an HTML document. Never fails: html5ever recovers from any markup.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    collect_text(document.root_element(), &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        // <title> lives in <head> but is what a search result shows.
        if name == "head" {
            for child in element.children().filter_map(ElementRef::wrap) {
                if child.value().name() == "title" {
                    collect_text(child, out);
                }
            }
        }
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
    if BLOCK_TAGS.contains(&name) {
        out.push('\n');
    }
}

/// [`sanitize_with`] using the default options.
pub fn sanitize(text: &str) -> String {
    sanitize_with(text, &SanitizeOptions::default())
}

/// Clean text for embedding: repair Unicode, transliterate to ASCII, swap entities for
/// placeholder tokens, normalize whitespace. Line breaks, case, punctuation and digits
/// survive. The pass is repeated until it reaches a fixed point, so the result is
/// idempotent.
pub fn sanitize_with(text: &str, options: &SanitizeOptions) -> String {
    let mut current = sanitize_pass(text, options);
    for _ in 0..MAX_SANITIZE_PASSES {
        let next = sanitize_pass(&current, options);
        if next == current {
            break;
        }
        trace!("Sanitizer needed another pass");
        current = next;
    }
    current
}

fn sanitize_pass(text: &str, options: &SanitizeOptions) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut text = INVISIBLE_RE.replace_all(&text, "").into_owned();

    if options.currency_symbols {
        text = CURRENCY_RE.replace_all(&text, CURRENCY_TOKEN).into_owned();
    }
    text = deunicode::deunicode_with_tofu(&text, "");
    // Transliteration can itself produce `$`.
    if options.currency_symbols {
        text = CURRENCY_RE.replace_all(&text, CURRENCY_TOKEN).into_owned();
    }

    text = normalize_whitespace(&text);

    if options.urls {
        text = URL_RE.replace_all(&text, URL_TOKEN).into_owned();
    }
    if options.emails {
        text = EMAIL_RE.replace_all(&text, EMAIL_TOKEN).into_owned();
    }
    if options.phone_numbers {
        text = PHONE_RE.replace_all(&text, PHONE_TOKEN).into_owned();
    }
    text
}

fn normalize_whitespace(text: &str) -> String {
    let collapsed = HSPACE_RE.replace_all(text, " ");
    let trimmed = collapsed
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    LINEBREAKS_RE
        .replace_all(&trimmed, "\n")
        .trim_matches('\n')
        .to_string()
}

/// Split on line breaks, trim each line, drop the empty ones.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lines of visible text from an HTML document, optionally sanitized.
#[tracing::instrument(level = "trace", skip(html))]
pub fn strip_site(html: &str, sanitize_text: bool) -> Vec<String> {
    let text = extract_text(html);
    if sanitize_text {
        split_lines(&sanitize(&text))
    } else {
        split_lines(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_visible_text_only() {
        let html = r#"<html><head><title>Shoes</title><style>p { color: red }</style>
            <script>var x = "hidden";</script></head>
            <body><h1>Best shoes</h1><p>Buy <b>now</b></p><noscript>enable js</noscript></body></html>"#;
        let text = extract_text(html);
        assert!(text.contains("Shoes"));
        assert!(text.contains("Best shoes"));
        assert!(text.contains("Buy now"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
        assert!(!text.contains("enable js"));
    }

    #[test]
    fn block_elements_end_lines() {
        let lines = split_lines(&extract_text(
            "<div>first</div><div>second<br>third</div><ul><li>a</li><li>b</li></ul>",
        ));
        assert_eq!(lines, vec!["first", "second", "third", "a", "b"]);
    }

    #[test]
    fn tolerates_malformed_markup() {
        let text = extract_text("<html><body><p>open <b>bold <i>both</p></div></span>tail");
        assert!(text.contains("open bold both"));
        assert!(text.contains("tail"));
        assert_eq!(extract_text(""), "");
        assert_eq!(split_lines(&extract_text("<<<>>>")), vec!["<<<>>>"]);
    }

    #[test]
    fn split_lines_drops_blank_lines() {
        let text = "  alpha \n\n\t\n beta\r\n   \ngamma";
        let lines = split_lines(text);
        assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
        assert!(lines.len() <= text.matches('\n').count() + 1);
        assert!(lines.iter().all(|l| !l.trim().is_empty()));
    }

    #[test]
    fn split_lines_of_whitespace_is_empty() {
        assert!(split_lines(" \n \n\t").is_empty());
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn sanitize_replaces_entities_with_tokens() {
        let text = "Visit https://example.com/shoes?id=1, or www.shoes.io.\n\
                    Mail sales@shoes.com or call (555) 123-4567.\n\
                    Only €49 or $52!";
        let clean = sanitize(text);
        assert_eq!(
            clean,
            "Visit <URL>, or <URL>.\nMail <EMAIL> or call <PHONE>.\nOnly <CUR>49 or <CUR>52!"
        );
    }

    #[test]
    fn sanitize_transliterates_and_preserves_case() {
        assert_eq!(sanitize("Crème Brûlée – “Déjà vu”"), "Creme Brulee - \"Deja vu\"");
        assert_eq!(sanitize("MiXeD 123"), "MiXeD 123");
    }

    #[test]
    fn sanitize_repairs_whitespace_and_control_chars() {
        let text = "a\u{200B}b\u{0007}  c\r\n\r\n\r\n  d\u{FFFD}  ";
        assert_eq!(sanitize(text), "ab c\nd");
    }

    #[test]
    fn sanitize_respects_options() {
        let options = SanitizeOptions {
            urls: false,
            emails: true,
            phone_numbers: false,
            currency_symbols: false,
        };
        let clean = sanitize_with("see https://a.io, a@b.com, 555-123-4567, $5", &options);
        assert_eq!(clean, "see https://a.io, <EMAIL>, 555-123-4567, $5");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "",
            "plain text",
            "Crème Brûlée – “Déjà vu” ¥100 £5",
            "call +1 555 123 4567 or 555.123.4567\nmail a.b@c.co.uk",
            "https://x.io/path/555-123-4567 and www.y.com.",
            "a@b.com555-123-4567",
            "   lots \t of\n\n\n   space   ",
            "中文 текст ελληνικά",
            "<URL> <EMAIL> <PHONE> <CUR>",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn strip_site_yields_clean_lines() {
        let html = "<html><body><p>Order at https://shop.example</p>\n\n<p>  Café  </p></body></html>";
        assert_eq!(strip_site(html, true), vec!["Order at <URL>", "Cafe"]);
        assert_eq!(
            strip_site(html, false),
            vec!["Order at https://shop.example", "Café"]
        );
    }
}

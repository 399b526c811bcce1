use once_cell::sync::Lazy;
use regex::Regex;

use super::common::decode_entities;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<(/)?([a-zA-Z][a-zA-Z0-9]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/)?>"#,
    )
    .expect("tag regex must compile")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute regex must compile")
});

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub self_closing: bool,
}

impl StartTag {
    /// Attribute value with entities decoded.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class_prefix(&self, prefix: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c.starts_with(prefix)))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Whether the element has no closing tag and must not be tracked as open.
    pub fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlToken<'a> {
    /// Raw text, entities still encoded.
    Text(&'a str),
    Start(StartTag),
    End(String),
}

/// Splits an HTML fragment into text runs and tags. Anything that does not
/// look like a well-formed tag stays in the text, comments are dropped.
pub fn tokenize(input: &str) -> Vec<HtmlToken<'_>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            tokens.push(HtmlToken::Text(&input[cursor..whole.start()]));
        }
        cursor = whole.end();

        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();

        if caps.get(1).is_some() {
            tokens.push(HtmlToken::End(name));
            continue;
        }

        let attrs = caps
            .get(3)
            .map(|raw| parse_attrs(raw.as_str()))
            .unwrap_or_default();
        tokens.push(HtmlToken::Start(StartTag {
            name,
            attrs,
            self_closing: caps.get(4).is_some(),
        }));
    }

    if cursor < input.len() {
        tokens.push(HtmlToken::Text(&input[cursor..]));
    }
    tokens
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{HtmlToken, tokenize};

    #[test]
    fn splits_tags_and_text() {
        let tokens = tokenize(r#"<p>Hi <a href="/u/bob?x=1&amp;y=2">@bob</a></p>"#);
        assert_eq!(tokens.len(), 6);
        let HtmlToken::Start(anchor) = &tokens[2] else {
            panic!("expected anchor start tag, got {:?}", tokens[2]);
        };
        assert_eq!(anchor.name, "a");
        assert_eq!(anchor.attr("href"), Some("/u/bob?x=1&y=2"));
        assert_eq!(tokens[3], HtmlToken::Text("@bob"));
        assert_eq!(tokens[5], HtmlToken::End("p".to_string()));
    }

    #[test]
    fn keeps_stray_angle_brackets_as_text() {
        let tokens = tokenize("1 < 2 and 3 > 2");
        assert_eq!(tokens, vec![HtmlToken::Text("1 < 2 and 3 > 2")]);
    }

    #[test]
    fn parses_unquoted_and_boolean_attributes() {
        let tokens = tokenize("<IMG src=/a.png class='emoji only-emoji' loading=lazy hidden>");
        let HtmlToken::Start(img) = &tokens[0] else {
            panic!("expected img start tag");
        };
        assert_eq!(img.name, "img");
        assert!(img.is_void());
        assert_eq!(img.attr("src"), Some("/a.png"));
        assert!(img.has_class("emoji"));
        assert!(img.has_class_prefix("only"));
        assert_eq!(img.attr("hidden"), Some(""));
    }

    #[test]
    fn drops_comments() {
        let tokens = tokenize("a<!-- <b>hidden</b> -->b");
        assert_eq!(tokens, vec![HtmlToken::Text("a"), HtmlToken::Text("b")]);
    }
}

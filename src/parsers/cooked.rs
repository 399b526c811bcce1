//! Forum "cooked" HTML to Telegram HTML.
//!
//! The input is tokenized and folded into a flat list of [`Fragment`]s:
//! escaped text, newlines and the open/close markers of the markup Telegram
//! understands. Source tags never reach the output directly, so user content
//! cannot forge markup, and the element stack keeps the emitted tags balanced.

use super::common::{
    decode_entities, escape_attr, escape_html, normalize_url, truncate_visible, visible_len,
};
use super::emoji;
use super::html::{HtmlToken, StartTag, tokenize};

/// Appended to truncated output. Exactly twenty characters long.
pub const TRUNCATION_NOTICE: &str = "\n[message truncated]";

const TELEGRAM_FILE_HOST: &str = "https://api.telegram.org";
const TELEGRAM_PHOTO_PLACEHOLDER: &str = "[tg photo]";
const EMOJI_PLACEHOLDER: &str = "[emoji]";
const REPLY_MARKER: &str = "RE:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookedOptions {
    /// Replace emoji images with glyphs instead of leaving them for the
    /// photo attachment pass.
    pub strip_emoji: bool,
    pub max_length: usize,
    /// Forum origin used to resolve relative links. Relative links are
    /// dropped when unset.
    pub base_url: Option<String>,
}

impl Default for CookedOptions {
    fn default() -> Self {
        Self {
            strip_emoji: true,
            max_length: 3000,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Pre,
    Link(String),
    Spoiler,
}

impl Markup {
    fn open_tag(&self) -> String {
        match self {
            Markup::Bold => "<b>".to_string(),
            Markup::Italic => "<i>".to_string(),
            Markup::Underline => "<u>".to_string(),
            Markup::Strike => "<s>".to_string(),
            Markup::Code => "<code>".to_string(),
            Markup::Pre => "<pre>".to_string(),
            Markup::Link(href) => format!("<a href=\"{}\">", escape_attr(href)),
            Markup::Spoiler => "<tg-spoiler>".to_string(),
        }
    }

    fn close_tag(&self) -> &'static str {
        match self {
            Markup::Bold => "</b>",
            Markup::Italic => "</i>",
            Markup::Underline => "</u>",
            Markup::Strike => "</s>",
            Markup::Code => "</code>",
            Markup::Pre => "</pre>",
            Markup::Link(_) => "</a>",
            Markup::Spoiler => "</tg-spoiler>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Already escaped for HTML parse mode.
    Text(String),
    Open(Markup),
    Close(Markup),
    Newline,
}

struct Frame {
    tag: String,
    markup: Option<Markup>,
    skip: bool,
}

#[derive(Default)]
struct Folder {
    fragments: Vec<Fragment>,
    stack: Vec<Frame>,
}

impl Folder {
    fn skipping(&self) -> bool {
        self.stack.iter().any(|frame| frame.skip)
    }

    fn inside_pre(&self) -> bool {
        self.stack
            .iter()
            .any(|frame| matches!(frame.markup, Some(Markup::Pre)))
    }

    fn inside_link(&self) -> bool {
        self.stack
            .iter()
            .any(|frame| matches!(frame.markup, Some(Markup::Link(_))))
    }

    fn text(&mut self, text: &str) {
        if !text.is_empty() {
            self.fragments.push(Fragment::Text(escape_html(text)));
        }
    }

    fn open(&mut self, tag: &StartTag, markup: Option<Markup>, skip: bool) {
        // Telegram rejects nested links and markup inside code blocks.
        let markup = markup.filter(|markup| {
            !(self.inside_pre() || matches!(markup, Markup::Link(_)) && self.inside_link())
        });
        if let Some(markup) = &markup {
            self.fragments.push(Fragment::Open(markup.clone()));
        }
        if !tag.is_void() {
            self.stack.push(Frame {
                tag: tag.name.clone(),
                markup,
                skip,
            });
        }
    }

    fn close(&mut self, name: &str) -> bool {
        let Some(pos) = self.stack.iter().rposition(|frame| frame.tag == name) else {
            return false;
        };
        for frame in self.stack.drain(pos..).rev() {
            if let Some(markup) = frame.markup {
                self.fragments.push(Fragment::Close(markup));
            }
        }
        true
    }

    fn finish(mut self) -> Vec<Fragment> {
        while let Some(frame) = self.stack.pop() {
            if let Some(markup) = frame.markup {
                self.fragments.push(Fragment::Close(markup));
            }
        }
        self.fragments
    }
}

/// Converts cooked forum HTML into the fragment list.
pub fn fragments(cooked: &str, options: &CookedOptions) -> Vec<Fragment> {
    let base = options.base_url.as_deref();
    let mut folder = Folder::default();

    for token in tokenize(cooked) {
        match token {
            HtmlToken::Text(raw) => {
                if !folder.skipping() {
                    folder.text(&decode_entities(raw));
                }
            }
            HtmlToken::End(name) => {
                let skipped = folder.skipping();
                if folder.close(&name) && !skipped && name == "p" {
                    folder.fragments.push(Fragment::Newline);
                }
            }
            HtmlToken::Start(tag) => {
                if folder.skipping() {
                    folder.open(&tag, None, false);
                    continue;
                }
                start_tag(&mut folder, &tag, options, base);
            }
        }
    }

    folder.finish()
}

fn start_tag(folder: &mut Folder, tag: &StartTag, options: &CookedOptions, base: Option<&str>) {
    if tag.has_class_prefix("spoiler") {
        folder.open(tag, Some(Markup::Spoiler), false);
        return;
    }

    let markup = match tag.name.as_str() {
        "aside" if tag.has_class_prefix("onebox") => {
            if let Some(src) = tag.attr("data-onebox-src") {
                embed_link(folder, src);
            }
            folder.open(tag, None, true);
            return;
        }
        "aside" | "blockquote" => Some(Markup::Pre),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "strong" | "b" => Some(Markup::Bold),
        "em" | "i" => Some(Markup::Italic),
        "u" | "ins" => Some(Markup::Underline),
        "s" | "strike" | "del" => Some(Markup::Strike),
        "code" => Some(Markup::Code),
        "pre" => Some(Markup::Pre),
        "a" => tag
            .attr("href")
            .and_then(|href| normalize_url(href, base))
            .map(Markup::Link),
        "p" | "br" => {
            folder.fragments.push(Fragment::Newline);
            None
        }
        "script" | "style" | "template" => {
            folder.open(tag, None, true);
            return;
        }
        "img" => {
            image(folder, tag, options);
            return;
        }
        _ => None,
    };
    folder.open(tag, markup, false);
}

fn embed_link(folder: &mut Folder, src: &str) {
    let Some(href) = normalize_url(src, None) else {
        folder.text(src);
        return;
    };
    if folder.inside_pre() || folder.inside_link() {
        folder.text(&href);
        return;
    }
    folder.fragments.push(Fragment::Open(Markup::Link(href.clone())));
    folder.text(&href);
    folder.fragments.push(Fragment::Close(Markup::Link(href)));
}

fn image(folder: &mut Folder, tag: &StartTag, options: &CookedOptions) {
    let src = tag.attr("src").unwrap_or_default();
    if is_emoji(tag) {
        if options.strip_emoji {
            let glyph = emoji::emoji_name(src, tag.attr("title").or_else(|| tag.attr("alt")))
                .and_then(emoji::glyph)
                .unwrap_or(EMOJI_PLACEHOLDER);
            folder.text(glyph);
        }
    } else if src.starts_with(TELEGRAM_FILE_HOST) {
        folder.text(TELEGRAM_PHOTO_PLACEHOLDER);
    } else if tag.has_class_prefix("avatar") {
        folder.text(REPLY_MARKER);
    }
}

pub(crate) fn is_emoji(tag: &StartTag) -> bool {
    tag.attr("src")
        .is_some_and(|src| src.starts_with("/images/emoji/") || src.contains("/images/emoji/"))
        || tag.has_class("emoji")
}

/// Joins fragments into Telegram HTML, dropping markup when `plain` is set.
/// Runs of newlines collapse into one.
pub fn render_fragments(fragments: &[Fragment], plain: bool) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text(text) => out.push_str(text),
            Fragment::Newline => out.push('\n'),
            Fragment::Open(markup) if !plain => out.push_str(&markup.open_tag()),
            Fragment::Close(markup) if !plain => out.push_str(markup.close_tag()),
            Fragment::Open(_) | Fragment::Close(_) => {}
        }
    }
    collapse_newlines(&out)
}

fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_newline = false;
    for ch in text.chars() {
        if ch == '\n' {
            if !last_newline {
                out.push(ch);
            }
            last_newline = true;
        } else {
            out.push(ch);
            last_newline = false;
        }
    }
    out
}

/// Converts forum cooked HTML into Telegram HTML within `max_length`.
///
/// Output over budget falls back to plain text; when that is still too long
/// the first `max_length - 20` characters are kept and [`TRUNCATION_NOTICE`]
/// is appended. Budgets too small for the notice get a bare cut.
pub fn render_cooked(cooked: &str, options: &CookedOptions) -> String {
    let fragments = fragments(cooked, options);
    let rich = render_fragments(&fragments, false);
    if rich.chars().count() <= options.max_length {
        return rich;
    }

    let plain = render_fragments(&fragments, true);
    if visible_len(&plain) <= options.max_length {
        return plain;
    }

    let notice_len = TRUNCATION_NOTICE.chars().count();
    if options.max_length <= notice_len {
        return truncate_visible(&plain, options.max_length).to_string();
    }
    let keep = options.max_length - notice_len;
    format!("{}{}", truncate_visible(&plain, keep), TRUNCATION_NOTICE)
}

/// Absolute URLs of images worth sending as photos: everything except
/// embed previews, avatars, images already hosted by Telegram and, when
/// `skip_emoji` is set, emoji.
pub fn extract_image_sources(cooked: &str, skip_emoji: bool, base_url: Option<&str>) -> Vec<String> {
    let mut sources = Vec::new();
    let mut skip_stack: Vec<String> = Vec::new();

    for token in tokenize(cooked) {
        match token {
            HtmlToken::Start(tag) => {
                if !skip_stack.is_empty() {
                    if !tag.is_void() && tag.name == skip_stack[0] {
                        skip_stack.push(tag.name.clone());
                    }
                    continue;
                }
                if tag.name == "aside" && tag.has_class_prefix("onebox") {
                    skip_stack.push(tag.name.clone());
                    continue;
                }
                if tag.name != "img" || tag.has_class_prefix("avatar") {
                    continue;
                }
                if skip_emoji && is_emoji(&tag) {
                    continue;
                }
                let Some(src) = tag.attr("src") else {
                    continue;
                };
                if src.starts_with(TELEGRAM_FILE_HOST) {
                    continue;
                }
                if let Some(url) = normalize_url(src, base_url) {
                    sources.push(url);
                }
            }
            HtmlToken::End(name) => {
                if skip_stack.first().is_some_and(|outer| *outer == name) {
                    skip_stack.pop();
                }
            }
            HtmlToken::Text(_) => {}
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{CookedOptions, TRUNCATION_NOTICE, extract_image_sources, render_cooked};

    fn opts() -> CookedOptions {
        CookedOptions {
            base_url: Some("https://forum.example.org".to_string()),
            ..CookedOptions::default()
        }
    }

    #[test_case("<p>hello</p>", "\nhello\n" ; "paragraph becomes newlines")]
    #[test_case("<h2>Title</h2><p>body</p>", "<b>Title</b>\nbody\n" ; "heading becomes bold")]
    #[test_case("<p><strong>a</strong> <em>b</em> <ins>c</ins> <del>d</del></p>", "\n<b>a</b> <i>b</i> <u>c</u> <s>d</s>\n" ; "inline tags survive")]
    #[test_case("<pre><code class=\"lang-rust\">let x = 1 &lt; 2;</code></pre>", "<pre>let x = 1 &lt; 2;</pre>" ; "code block keeps escapes")]
    #[test_case("<aside class=\"quote\" data-post=\"2\"><blockquote><p>hi</p></blockquote></aside>", "<pre>\nhi\n</pre>" ; "quote becomes pre")]
    #[test_case("<p>a<br>b</p>", "\na\nb\n" ; "line break")]
    #[test_case("<div class=\"spoiler\">secret</div>", "<tg-spoiler>secret</tg-spoiler>" ; "spoiler")]
    #[test_case("<p><a href=\"/u/bob\">@bob</a></p>", "\n<a href=\"https://forum.example.org/u/bob\">@bob</a>\n" ; "relative link resolved")]
    #[test_case("<p><a href=\"#x\">anchor</a></p>", "\nanchor\n" ; "fragment link dropped")]
    #[test_case("<p>Nice <img src=\"/images/emoji/twitter/yum.png?v=12\" title=\":yum:\" class=\"emoji\" alt=\":yum:\"></p>", "\nNice 😋\n" ; "known emoji")]
    #[test_case("<p><img src=\"/images/emoji/twitter/unheard_of.png\" class=\"emoji\"></p>", "\n[emoji]\n" ; "unknown emoji")]
    #[test_case("<p><img src=\"https://api.telegram.org/file/bot1/a.jpg\"></p>", "\n[tg photo]\n" ; "telegram hosted photo")]
    #[test_case("<div class=\"title\"><img alt=\"\" width=\"24\" height=\"24\" src=\"/a.png\" class=\"avatar\"> bob:</div>", "RE: bob:" ; "avatar marker")]
    fn converts_cooked_html(input: &str, expected: &str) {
        assert_eq!(render_cooked(input, &opts()), expected);
    }

    #[test]
    fn onebox_becomes_plain_link() {
        let html = r#"<aside class="onebox allowlistedgeneric" data-onebox-src="https://example.com/a?b=1&amp;c=2"><header>site</header><article><h3>Big title</h3><p>blurb</p></article></aside>"#;
        assert_eq!(
            render_cooked(html, &opts()),
            r#"<a href="https://example.com/a?b=1&amp;c=2">https://example.com/a?b=1&amp;c=2</a>"#
        );
    }

    #[test]
    fn emoji_left_for_attachments_when_not_stripped() {
        let options = CookedOptions {
            strip_emoji: false,
            ..opts()
        };
        let html = r#"<p>hi <img src="/images/emoji/twitter/yum.png" class="emoji"></p>"#;
        assert_eq!(render_cooked(html, &options), "\nhi \n");
    }

    #[test]
    fn injected_tags_are_stripped() {
        let html = r#"<p>x <script>alert(1)</script><iframe src="evil"></iframe><span onclick="y">z</span> &lt;b&gt;not bold&lt;/b&gt; 1 < 2</p>"#;
        let out = render_cooked(html, &opts());
        assert_eq!(out, "\nx z &lt;b&gt;not bold&lt;/b&gt; 1 &lt; 2\n");
        assert!(!out.contains("<script"));
        assert!(!out.contains("<span"));
    }

    #[test]
    fn unbalanced_markup_is_closed() {
        let html = "<p><strong>bold <em>both</strong> tail</p><i>open";
        assert_eq!(
            render_cooked(html, &opts()),
            "\n<b>bold <i>both</i></b> tail\n<i>open</i>"
        );
    }

    #[test]
    fn output_is_deterministic() {
        let html = r#"<h1>T</h1><p>a <a href="https://x.org">x</a> <img src="/images/emoji/twitter/fire.png" class="emoji"></p>"#;
        let first = render_cooked(html, &opts());
        for _ in 0..5 {
            assert_eq!(render_cooked(html, &opts()), first);
        }
    }

    #[test]
    fn truncates_to_exact_budget() {
        let html = format!("<p><b>{}</b></p>", "x".repeat(200));
        let options = CookedOptions {
            max_length: 50,
            ..opts()
        };
        let out = render_cooked(&html, &options);
        assert_eq!(out.chars().count(), 50);
        assert!(out.ends_with(TRUNCATION_NOTICE));
        assert!(out.starts_with("\nxxx"));
        assert!(!out.contains("<b>"));
    }

    #[test]
    fn tiny_budget_never_overflows() {
        let html = format!("<p>{}</p>", "z".repeat(100));
        let options = CookedOptions {
            max_length: 10,
            ..opts()
        };
        let out = render_cooked(&html, &options);
        assert!(out.chars().count() <= 10);
        assert!(out.contains("zzzz"));
    }

    #[test]
    fn falls_back_to_plain_text_before_truncating() {
        let html = format!("<p><b>{}</b></p>", "y".repeat(40));
        let options = CookedOptions {
            max_length: 45,
            ..opts()
        };
        let out = render_cooked(&html, &options);
        assert_eq!(out, format!("\n{}\n", "y".repeat(40)));
    }

    #[test]
    fn image_extraction_skips_embeds_avatars_and_emoji() {
        let html = r#"
<aside class="onebox" data-onebox-src="https://e.org"><img src="https://e.org/thumb.png"></aside>
<p><img src="/uploads/default/a.png"> <img src="/images/emoji/twitter/yum.png" class="emoji">
<img src="/user_avatar/x.png" class="avatar"> <img src="https://api.telegram.org/file/bot/x.jpg">
<a class="lightbox" href="/uploads/full.png"><img src="//cdn.example.org/b.png"></a></p>"#;

        assert_eq!(
            extract_image_sources(html, true, Some("https://forum.example.org")),
            vec![
                "https://forum.example.org/uploads/default/a.png".to_string(),
                "https://cdn.example.org/b.png".to_string(),
            ]
        );
        assert_eq!(
            extract_image_sources(html, false, Some("https://forum.example.org")).len(),
            3
        );
    }
}

use crate::discourse::{PostSummary, TopicSummary};
use crate::parsers::{CookedOptions, escape_html, render_cooked};
use crate::parsers::common::visible_len;
use crate::telegram::MEDIA_GROUP_LIMIT;
use crate::telegram::types::Sticker;

use super::settings::Author;

pub(crate) const NO_TEXT_NOTICE: &str = "No text detected.";
pub(crate) const VIDEO_NOTICE: &str = "\n[video] Forwarding videos is not supported yet.";
pub(crate) const JOIN_VERIFICATION_MESSAGE: &str = "(Request to join telegram group)";
pub(crate) const SOURCE_NOT_FOUND_NOTICE: &str =
    "Source post not found. Its link may have expired or the bot was restarted.";
pub(crate) const SHUT_UP: &str = "shut up";

const POST_SEPARATOR: &str = "\n------------\n";

/// Which forum surface Telegram content is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    Post,
    Chat,
}

/// Outbound Telegram calls for one forum message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPlan {
    Text {
        text: String,
    },
    Photo {
        photo: String,
        caption: String,
    },
    /// Text first, then the images in albums of at most [`MEDIA_GROUP_LIMIT`].
    TextWithAlbums {
        text: String,
        albums: Vec<Vec<String>>,
    },
}

impl MediaPlan {
    #[cfg(test)]
    pub fn albums(&self) -> &[Vec<String>] {
        match self {
            MediaPlan::TextWithAlbums { albums, .. } => albums,
            _ => &[],
        }
    }
}

pub(crate) fn plan_media(text: String, images: Vec<String>) -> MediaPlan {
    match images.len() {
        0 => MediaPlan::Text { text },
        1 => MediaPlan::Photo {
            photo: images.into_iter().next().unwrap_or_default(),
            caption: text,
        },
        _ => MediaPlan::TextWithAlbums {
            text,
            albums: images
                .chunks(MEDIA_GROUP_LIMIT)
                .map(<[String]>::to_vec)
                .collect(),
        },
    }
}

/// Budget left for a body once `header` is prepended.
pub(crate) fn body_budget(limit: usize, header: &str) -> usize {
    limit.saturating_sub(visible_len(header))
}

pub(crate) fn post_header(
    forum_url: &str,
    username: &str,
    topic_id: i64,
    post_number: Option<i64>,
    title: &str,
) -> String {
    let mut link = format!("{forum_url}/t/-/{topic_id}");
    if let Some(number) = post_number {
        link.push_str(&format!("/{number}"));
    }
    format!(
        "<b>{} in <a href=\"{}\">{}</a></b>\n",
        escape_html(username),
        link,
        escape_html(title)
    )
}

pub(crate) fn chat_header(username: &str) -> String {
    format!("<b>{}</b>:\n", escape_html(username))
}

/// A new message repeats its author's name unless the same author sent the
/// previous message and this one is not a reply.
pub(crate) fn needs_header(last: Option<&Author>, author: &Author, is_reply: bool) -> bool {
    is_reply || last != Some(author)
}

pub(crate) fn attribution(name: &str, path: RenderPath) -> String {
    match path {
        RenderPath::Post => format!("**{name} replied from Telegram:**\n"),
        RenderPath::Chat => format!("**{name} in Telegram:**\n"),
    }
}

pub(crate) fn sticker_needs_link(sticker: &Sticker) -> bool {
    !sticker.is_animated
}

pub(crate) fn sticker_markdown(sticker: &Sticker, link: Option<&str>, path: RenderPath) -> String {
    let emoji = sticker.emoji.as_deref().unwrap_or_default();
    let link = link.unwrap_or_default();
    let is_video = sticker.is_video || link.ends_with(".webm");
    let is_animated = sticker.is_animated || link.ends_with(".tgs");

    match (path, is_video, is_animated) {
        (RenderPath::Post, true, _) => format!("\n![sticker|video]({link})"),
        (RenderPath::Chat, true, _) => format!("[(Telegram Sticker)]({link}){emoji}"),
        (RenderPath::Post, false, true) => format!(
            "[sticker {} {emoji}]",
            sticker.set_name.as_deref().unwrap_or_default()
        ),
        (RenderPath::Chat, false, true) => format!("[sticker]{emoji}"),
        (_, false, false) => format!("\n![sticker]({link})"),
    }
}

pub(crate) fn photo_markdown(link: &str) -> String {
    if link.ends_with(".webm") {
        format!("\n![photo|video]({link})")
    } else {
        format!("\n![photo]({link})")
    }
}

/// Body of the `/latest` and `/next` answers.
pub(crate) fn topic_list_message(topics: &[TopicSummary], categories: &[i64]) -> String {
    let lines: Vec<String> = topics
        .iter()
        .filter(|topic| {
            categories.is_empty()
                || topic
                    .category_id
                    .is_some_and(|category| categories.contains(&category))
        })
        .map(|topic| format!("/replyto_{} {}", topic.id, topic.title))
        .collect();

    let mut message = String::from("Use a command to reply:\n");
    if !lines.is_empty() {
        message.push_str(&lines.join("\n"));
        message.push('\n');
    }
    message.push_str("/next next page");
    message
}

/// Prompt listing the last posts of a topic; replying to it posts there.
pub(crate) fn recent_posts_message(
    forum_url: &str,
    topic_id: i64,
    title: &str,
    posts: &[PostSummary],
    max_length: usize,
) -> String {
    let recent = &posts[posts.len().saturating_sub(3)..];
    let options = CookedOptions {
        max_length: max_length / recent.len().max(1),
        base_url: Some(forum_url.to_string()),
        ..CookedOptions::default()
    };
    let rendered: Vec<String> = recent
        .iter()
        .map(|post| {
            format!(
                "<b>{}</b>:\n{}",
                escape_html(&post.username),
                render_cooked(&post.cooked, &options).trim()
            )
        })
        .collect();

    format!(
        "<a href=\"{forum_url}/t/-/{topic_id}\">{}</a> latest posts:{POST_SEPARATOR}{}{POST_SEPARATOR}Reply to this message to post in this topic:",
        escape_html(title),
        rendered.join(POST_SEPARATOR)
    )
}

pub(crate) fn join_request_notice(name: &str, text: &str) -> String {
    format!("New user waiting to join: {name}\nMessage: {text}")
}

pub(crate) fn toggle_notice(feature: &str, enabled: bool) -> String {
    format!(
        "{} {feature}.",
        if enabled { "Enabled" } else { "Disabled" }
    )
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{
        MediaPlan, RenderPath, attribution, needs_header, plan_media, post_header,
        recent_posts_message, sticker_markdown, topic_list_message,
    };
    use crate::bridge::settings::Author;
    use crate::discourse::{PostSummary, TopicSummary};
    use crate::telegram::types::Sticker;

    fn images(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://forum.example.org/uploads/{i}.png"))
            .collect()
    }

    #[test]
    fn plans_text_photo_or_albums() {
        assert_eq!(
            plan_media("hi".to_string(), Vec::new()),
            MediaPlan::Text { text: "hi".to_string() }
        );
        assert!(matches!(
            plan_media("hi".to_string(), images(1)),
            MediaPlan::Photo { ref caption, .. } if caption == "hi"
        ));

        let plan = plan_media("hi".to_string(), images(23));
        let sizes: Vec<usize> = plan.albums().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[test]
    fn header_is_omitted_for_consecutive_messages() {
        let ann = Author::Forum("ann".to_string());
        assert!(needs_header(None, &ann, false));
        assert!(!needs_header(Some(&ann), &ann, false));
        assert!(needs_header(Some(&ann), &ann, true));
        assert!(needs_header(Some(&Author::Telegram(1)), &ann, false));
    }

    #[test]
    fn post_header_links_the_post() {
        assert_eq!(
            post_header("https://f.org", "a<b", 4, Some(2), "T & C"),
            "<b>a&lt;b in <a href=\"https://f.org/t/-/4/2\">T &amp; C</a></b>\n"
        );
    }

    #[test]
    fn attribution_wording_depends_on_path() {
        assert_eq!(attribution("Ann", RenderPath::Post), "**Ann replied from Telegram:**\n");
        assert_eq!(attribution("Ann", RenderPath::Chat), "**Ann in Telegram:**\n");
    }

    fn sticker(is_animated: bool, is_video: bool) -> Sticker {
        Sticker {
            file_id: "f".to_string(),
            emoji: Some("😀".to_string()),
            set_name: Some("cats".to_string()),
            is_animated,
            is_video,
        }
    }

    #[test_case(false, false, RenderPath::Post, "\n![sticker](L)" ; "static post")]
    #[test_case(false, true, RenderPath::Post, "\n![sticker|video](L)" ; "video post")]
    #[test_case(true, false, RenderPath::Post, "[sticker cats 😀]" ; "animated post")]
    #[test_case(false, true, RenderPath::Chat, "[(Telegram Sticker)](L)😀" ; "video chat")]
    #[test_case(true, false, RenderPath::Chat, "[sticker]😀" ; "animated chat")]
    fn renders_stickers(is_animated: bool, is_video: bool, path: RenderPath, expected: &str) {
        assert_eq!(
            sticker_markdown(&sticker(is_animated, is_video), Some("L"), path),
            expected
        );
    }

    #[test]
    fn topic_list_filters_categories() {
        let topics = vec![
            TopicSummary { id: 1, title: "One".to_string(), category_id: Some(4) },
            TopicSummary { id: 2, title: "Two".to_string(), category_id: Some(5) },
        ];
        assert_eq!(
            topic_list_message(&topics, &[4]),
            "Use a command to reply:\n/replyto_1 One\n/next next page"
        );
        assert!(topic_list_message(&topics, &[]).contains("/replyto_2 Two"));
    }

    #[test]
    fn recent_posts_keeps_last_three() {
        let posts: Vec<PostSummary> = (0..5)
            .map(|i| PostSummary {
                username: format!("u{i}"),
                cooked: format!("<p>post {i}</p>"),
            })
            .collect();
        let message = recent_posts_message("https://f.org", 9, "Topic", &posts, 3000);
        assert!(message.starts_with("<a href=\"https://f.org/t/-/9\">Topic</a>"));
        assert!(!message.contains("u1"));
        assert!(message.contains("<b>u2</b>:\npost 2"));
        assert!(message.ends_with("Reply to this message to post in this topic:"));
    }
}

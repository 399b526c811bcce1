/// Glyph for a forum emoji shortcode name, when the bridge knows one.
pub fn glyph(name: &str) -> Option<&'static str> {
    let glyph = match name {
        "smiling_face_with_three_hearts" => "🥰",
        "yum" => "😋",
        "hot_face" => "🥵",
        "smile" => "😄",
        "smiley" => "😃",
        "grinning" => "😀",
        "grin" => "😁",
        "laughing" => "😆",
        "sweat_smile" => "😅",
        "joy" => "😂",
        "rofl" | "rolling_on_the_floor_laughing" => "🤣",
        "slightly_smiling_face" => "🙂",
        "upside_down_face" => "🙃",
        "wink" => "😉",
        "blush" => "😊",
        "innocent" => "😇",
        "heart_eyes" => "😍",
        "star_struck" => "🤩",
        "kissing_heart" => "😘",
        "stuck_out_tongue" => "😛",
        "stuck_out_tongue_winking_eye" => "😜",
        "thinking" => "🤔",
        "neutral_face" => "😐",
        "expressionless" => "😑",
        "smirk" => "😏",
        "unamused" => "😒",
        "roll_eyes" | "face_with_rolling_eyes" => "🙄",
        "grimacing" => "😬",
        "relieved" => "😌",
        "pensive" => "😔",
        "sleepy" => "😪",
        "sleeping" => "😴",
        "drooling_face" => "🤤",
        "mask" => "😷",
        "sunglasses" => "😎",
        "nerd_face" => "🤓",
        "confused" => "😕",
        "worried" => "😟",
        "open_mouth" => "😮",
        "astonished" => "😲",
        "flushed" => "😳",
        "pleading_face" => "🥺",
        "cry" => "😢",
        "sob" => "😭",
        "scream" => "😱",
        "angry" => "😠",
        "rage" => "😡",
        "skull" => "💀",
        "clown_face" => "🤡",
        "see_no_evil" => "🙈",
        "heart" => "❤️",
        "broken_heart" => "💔",
        "sparkling_heart" => "💖",
        "two_hearts" => "💕",
        "fire" => "🔥",
        "sparkles" => "✨",
        "star" => "⭐",
        "100" => "💯",
        "tada" => "🎉",
        "+1" | "thumbsup" => "👍",
        "-1" | "thumbsdown" => "👎",
        "clap" => "👏",
        "pray" => "🙏",
        "ok_hand" => "👌",
        "wave" => "👋",
        "muscle" => "💪",
        "eyes" => "👀",
        "point_up" => "☝️",
        "white_check_mark" => "✅",
        "x" => "❌",
        "warning" => "⚠️",
        "question" => "❓",
        "exclamation" => "❗",
        _ => return None,
    };
    Some(glyph)
}

/// Shortcode name of an emoji image, read from its `title`/`alt` (`:name:`)
/// or from the file name in `/images/emoji/<set>/<name>.png`.
pub fn emoji_name<'a>(src: &'a str, title: Option<&'a str>) -> Option<&'a str> {
    if let Some(name) = title
        .map(|t| t.trim().trim_matches(':'))
        .filter(|t| !t.is_empty())
    {
        return Some(name.split(":t").next().unwrap_or(name));
    }
    let path = src.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let name = file.split('.').next()?;
    (!name.is_empty()).then_some(name)
}

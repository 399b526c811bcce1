use once_cell::sync::Lazy;
use regex::Regex;

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$")
        .expect("command regex must compile")
});

static REPLY_TO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^replyto_([0-9]+)$").expect("replyto regex must compile"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Latest,
    Next,
    ReplyTo { topic_id: i64, body: Option<String> },
    /// `/replyto` without a usable topic id.
    MalformedReplyTo,
    TogglePush,
    Speak,
    Login,
    Logout,
    Id,
    ToggleSync,
    SyncOn,
    SyncOff,
    IsSync,
    Unknown(String),
}

/// Parses a slash command. Returns `None` for plain text and for commands
/// explicitly addressed to another bot via the `@username` suffix.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<ParsedCommand> {
    let caps = COMMAND_RE.captures(text.trim())?;
    let name = caps.get(1)?.as_str();

    if let (Some(target), Some(own)) = (caps.get(2), bot_username) {
        if !own.is_empty() && !target.as_str().eq_ignore_ascii_case(own) {
            return None;
        }
    }

    let args = caps
        .get(3)
        .map(|m| m.as_str().trim())
        .filter(|args| !args.is_empty())
        .map(ToOwned::to_owned);

    let command = match name {
        "latest" => ParsedCommand::Latest,
        "next" => ParsedCommand::Next,
        "toggle_push" => ParsedCommand::TogglePush,
        "speak" => ParsedCommand::Speak,
        "login" => ParsedCommand::Login,
        "logout" => ParsedCommand::Logout,
        "id" => ParsedCommand::Id,
        "toggle_sync" => ParsedCommand::ToggleSync,
        "sync_on" => ParsedCommand::SyncOn,
        "sync_off" => ParsedCommand::SyncOff,
        "is_sync" => ParsedCommand::IsSync,
        other if other.starts_with("replyto") => parse_reply_to(other, args),
        other => ParsedCommand::Unknown(other.to_string()),
    };
    Some(command)
}

fn parse_reply_to(name: &str, body: Option<String>) -> ParsedCommand {
    REPLY_TO_RE
        .captures(name)
        .and_then(|caps| caps.get(1)?.as_str().parse::<i64>().ok())
        .map(|topic_id| ParsedCommand::ReplyTo { topic_id, body })
        .unwrap_or(ParsedCommand::MalformedReplyTo)
}

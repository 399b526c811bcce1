/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes a value placed inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    escape_html(value).replace('"', "&quot;")
}

/// Decodes the entities forum HTML actually produces. Unknown named
/// entities are left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest.find(';').filter(|&end| end <= 10) {
            Some(end) => match decode_entity(&rest[1..end]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &rest[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "hellip" => Some('…'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        _ => None,
    }
}

/// Resolves a forum-relative URL against `base`. Fragment-only and
/// non-http links resolve to `None`.
pub fn normalize_url(url: &str, base: Option<&str>) -> Option<String> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }
    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if url.starts_with('/') {
        return base.map(|base| format!("{}{}", base.trim_end_matches('/'), url));
    }
    None
}

/// Visible length of Telegram HTML text, counting each entity as one character.
pub fn visible_len(text: &str) -> usize {
    let mut len = 0;
    let mut chars = text.char_indices();
    while let Some((idx, ch)) = chars.next() {
        len += 1;
        if ch == '&' {
            if let Some(end) = entity_end(&text[idx..]) {
                for _ in 0..end {
                    chars.next();
                }
            }
        }
    }
    len
}

/// Keeps the first `limit` visible characters without splitting an entity.
pub fn truncate_visible(text: &str, limit: usize) -> &str {
    let mut count = 0;
    let mut chars = text.char_indices();
    while let Some((idx, ch)) = chars.next() {
        if count == limit {
            return &text[..idx];
        }
        count += 1;
        if ch == '&' {
            if let Some(end) = entity_end(&text[idx..]) {
                for _ in 0..end {
                    chars.next();
                }
            }
        }
    }
    text
}

// Number of characters after the '&' up to and including the ';'.
fn entity_end(text: &str) -> Option<usize> {
    let body = text.get(1..)?;
    let semi = body.find(';')?;
    let name = &body[..semi];
    let valid = !name.is_empty()
        && name.len() <= 8
        && (name.chars().all(|c| c.is_ascii_alphanumeric())
            || name.strip_prefix('#').is_some_and(|n| {
                !n.is_empty() && n.chars().all(|c| c.is_ascii_hexdigit() || c == 'x')
            }));
    valid.then(|| name.chars().count() + 1)
}

//! Mailbox extraction from address header fields

/// First `addr-spec` in an address list such as a `From` value
///
/// Handles `Name <addr>`, bare addresses, quoted display names and
/// comments. Returns `None` if no address with an `@` is found.
pub fn first_address(value: &str) -> Option<String> {
    let mailbox = first_mailbox(value);
    let mailbox = strip_comments(mailbox);

    let addr = match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(open), Some(close)) if open < close => &mailbox[open + 1..close],
        _ => mailbox.as_str(),
    };
    let addr = addr.trim();

    if addr.contains('@') && !addr.contains(char::is_whitespace) {
        Some(addr.to_string())
    } else {
        None
    }
}

/// Text up to the first top-level comma
fn first_mailbox(value: &str) -> &str {
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut depth = 0usize;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            ',' if !in_quotes && !in_angle && depth == 0 => return &value[..i],
            _ => {}
        }
    }
    value
}

/// Drop `(comments)` and quoted display names
fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes || depth > 0 => escaped = true,
            '"' if depth == 0 => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            c if !in_quotes && depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

//! Formatter: renders a [`BridgeMessage`] through the message template.
//!
//! Content is cleaned before substitution: Discord markup tokens are
//! removed literally (unpaired, so a lone `*` disappears too) and numeric
//! mentions are rewritten into readable placeholders. Truncation happens at
//! delivery time, not here.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::TemplateError;
use crate::pipeline::types::BridgeMessage;

/// Markup tokens stripped from content, in removal order.
const MARKUP_TOKENS: &[&str] = &["**", "*", "`", "~~"];

static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@!?(\d+)>").unwrap());
static CHANNEL_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<#(\d+)>").unwrap());
static ROLE_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@&(\d+)>").unwrap());

/// A named value a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    GuildName,
    ChannelName,
    AuthorName,
    Timestamp,
    Content,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Self::GuildName,
        Self::ChannelName,
        Self::AuthorName,
        Self::Timestamp,
        Self::Content,
    ];

    /// Canonical name as written in templates.
    pub fn name(self) -> &'static str {
        match self {
            Self::GuildName => "guildName",
            Self::ChannelName => "channelName",
            Self::AuthorName => "authorName",
            Self::Timestamp => "timestamp",
            Self::Content => "content",
        }
    }

    /// Resolve a placeholder name. The snake_case spellings are accepted so
    /// templates written for older configs keep working.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "guildName" | "guild_name" => Some(Self::GuildName),
            "channelName" | "channel_name" => Some(Self::ChannelName),
            "authorName" | "author_name" => Some(Self::AuthorName),
            "timestamp" => Some(Self::Timestamp),
            "content" => Some(Self::Content),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed message template.
///
/// `{name}` inserts a field, `{{` and `}}` are literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed { offset });
                    }
                    let field = Placeholder::from_name(name.trim()).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            name: name.clone(),
                            offset,
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateError::UnmatchedClose { offset });
                    }
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Render with already-cleaned content.
    pub fn render(&self, msg: &BridgeMessage, content: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Placeholder::GuildName) => out.push_str(&msg.source_group_name),
                Segment::Field(Placeholder::ChannelName) => {
                    out.push_str(&msg.source_channel_name)
                }
                Segment::Field(Placeholder::AuthorName) => out.push_str(&msg.author_name),
                Segment::Field(Placeholder::Timestamp) => out.push_str(&msg.timestamp),
                Segment::Field(Placeholder::Content) => out.push_str(content),
            }
        }
        out
    }
}

/// Strip markup then rewrite mentions.
pub fn clean_content(content: &str) -> String {
    let mut cleaned = content.to_string();
    for token in MARKUP_TOKENS {
        cleaned = cleaned.replace(token, "");
    }
    let cleaned = USER_MENTION.replace_all(&cleaned, "@user$1");
    let cleaned = CHANNEL_MENTION.replace_all(&cleaned, "#channel$1");
    let cleaned = ROLE_MENTION.replace_all(&cleaned, "@role$1");
    cleaned.into_owned()
}

/// Render `msg` through `template`.
pub fn format(msg: &BridgeMessage, template: &str) -> Result<String, TemplateError> {
    let template = Template::parse(template)?;
    Ok(template.render(msg, &clean_content(&msg.content)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> BridgeMessage {
        BridgeMessage {
            content: content.into(),
            author_name: "Ferris".into(),
            source_group_name: "Rustaceans".into(),
            source_channel_name: "general".into(),
            source_group_id: Some("1".into()),
            source_channel_id: Some("2".into()),
            timestamp: "2024-03-01 12:34:56".into(),
            attachments: vec![],
            is_automated: false,
        }
    }

    #[test]
    fn strips_markup_and_rewrites_mentions() {
        assert_eq!(
            clean_content("**hi** <@123> go to <#456>"),
            "hi @user123 go to #channel456"
        );
    }

    #[test]
    fn nickname_mention_form() {
        assert_eq!(clean_content("hey <@!42>"), "hey @user42");
    }

    #[test]
    fn role_mention() {
        assert_eq!(clean_content("ping <@&77>"), "ping @role77");
    }

    #[test]
    fn unpaired_markup_is_still_removed() {
        assert_eq!(clean_content("2 * 3 = 6 ~~x"), "2  3 = 6 x");
        assert_eq!(clean_content("`code`"), "code");
    }

    #[test]
    fn non_numeric_mentions_untouched() {
        assert_eq!(clean_content("<@abc> <#x>"), "<@abc> <#x>");
    }

    #[test]
    fn fills_all_placeholders() {
        let out = format(
            &message("hello"),
            "[{guildName}/#{channelName}] {authorName} @ {timestamp}: {content}",
        )
        .unwrap();
        assert_eq!(
            out,
            "[Rustaceans/#general] Ferris @ 2024-03-01 12:34:56: hello"
        );
    }

    #[test]
    fn snake_case_aliases() {
        let out = format(&message("x"), "{guild_name}|{channel_name}|{author_name}").unwrap();
        assert_eq!(out, "Rustaceans|general|Ferris");
    }

    #[test]
    fn plain_content_passes_through_unchanged() {
        let out = format(&message("just words here"), "{content}").unwrap();
        assert_eq!(out, "just words here");
    }

    #[test]
    fn escaped_braces() {
        let out = format(&message("c"), "{{literal}} {content}").unwrap();
        assert_eq!(out, "{literal} c");
    }

    #[test]
    fn unknown_placeholder_fails() {
        let err = format(&message("c"), "{content} {nope}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                name: "nope".into(),
                offset: 10
            }
        );
    }

    #[test]
    fn unclosed_brace_fails() {
        assert_eq!(
            Template::parse("abc {content"),
            Err(TemplateError::Unclosed { offset: 4 })
        );
    }

    #[test]
    fn stray_close_fails() {
        assert_eq!(
            Template::parse("abc } def"),
            Err(TemplateError::UnmatchedClose { offset: 4 })
        );
    }

    #[test]
    fn default_template_parses() {
        assert!(Template::parse(crate::config::DEFAULT_MESSAGE_TEMPLATE).is_ok());
    }
}

use crate::domain::ChatId;

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields should live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Message(IncomingMessage),
    /// Anything that is not a message (edits, callbacks, member updates...).
    Other,
}

#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat: Option<ChatInfo>,
    pub text: Option<String>,
    /// The platform marked the text as starting with a bot command.
    pub is_command: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: ChatKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// A parsed `/name[@bot] args` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Lowercased command name without the leading `/`.
    pub name: String,
    /// Bot username after `@`, if the command was addressed.
    pub addressee: Option<String>,
    pub args: String,
}

impl Command {
    /// Telegram may send `/cmd@botname arg1 ...`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let (name, addressee) = match head.split_once('@') {
            Some((name, bot)) => (name, Some(bot.to_string())),
            None => (head, None),
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_lowercase(),
            addressee,
            args,
        })
    }

    /// Unaddressed commands count as ours; addressed ones must name this bot.
    pub fn is_addressed_to(&self, bot_username: Option<&str>) -> bool {
        match (&self.addressee, bot_username) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(to), Some(me)) => to.eq_ignore_ascii_case(me.trim_start_matches('@')),
        }
    }
}

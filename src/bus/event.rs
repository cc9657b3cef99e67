//! Bus event types and the protocol forwarding table.

use crate::db::Identity;
use std::fmt;
use std::sync::Arc;

/// Protocol message as handed over by the network client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Full source prefix (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    pub nick: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    /// Protocol command or numeric (`PRIVMSG`, `001`, ...).
    pub command: String,
    pub args: Vec<String>,
}

/// Sender, target and text of one inbound chat message.
///
/// Built once per message and shared by every subscriber of the resulting
/// command event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub nick: String,
    /// Empty when the network client did not report it.
    pub username: String,
    /// Empty when the network client did not report it.
    pub hostname: String,
    /// Channel or nick the message was addressed to.
    pub to: String,
    pub text: String,
    pub raw_message: Option<RawMessage>,
}

impl Context {
    /// Where a reply should go: the channel for channel messages, the sender
    /// for private ones.
    pub fn reply_target(&self) -> &str {
        if self.to.starts_with(['#', '&']) {
            &self.to
        } else {
            &self.nick
        }
    }
}

impl Identity for Context {
    fn nickname(&self) -> &str {
        &self.nick
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }
}

/// Event names emitted by the network client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    Registered,
    Error,
    Action,
    Invite,
    Kill,
    Message,
    ChannelMessage,
    ModeAdd,
    ModeRemove,
    Motd,
    Names,
    Notice,
    Pm,
    Quit,
    SelfMessage,
    Topic,
    Join,
    Part,
    Kick,
    Nick,
    Whois,
    Ping,
    Raw,
}

impl ClientEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Error => "error",
            Self::Action => "action",
            Self::Invite => "invite",
            Self::Kill => "kill",
            Self::Message => "message",
            Self::ChannelMessage => "message#",
            Self::ModeAdd => "+mode",
            Self::ModeRemove => "-mode",
            Self::Motd => "motd",
            Self::Names => "names",
            Self::Notice => "notice",
            Self::Pm => "pm",
            Self::Quit => "quit",
            Self::SelfMessage => "selfMessage",
            Self::Topic => "topic",
            Self::Join => "join",
            Self::Part => "part",
            Self::Kick => "kick",
            Self::Nick => "nick",
            Self::Whois => "whois",
            Self::Ping => "ping",
            Self::Raw => "raw",
        }
    }
}

/// Names of protocol events re-published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Register,
    Error,
    Action,
    Invite,
    Kill,
    Message,
    ChannelMessage,
    ModeAdd,
    ModeRemove,
    Motd,
    Names,
    Notice,
    Pm,
    Quit,
    SelfEcho,
    Topic,
    Join,
    Part,
    Kick,
    Nick,
    Whois,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Error => "error",
            Self::Action => "action",
            Self::Invite => "invite",
            Self::Kill => "kill",
            Self::Message => "message",
            Self::ChannelMessage => "message#",
            Self::ModeAdd => "+mode",
            Self::ModeRemove => "-mode",
            Self::Motd => "motd",
            Self::Names => "names",
            Self::Notice => "notice",
            Self::Pm => "pm",
            Self::Quit => "quit",
            Self::SelfEcho => "self",
            Self::Topic => "topic",
            Self::Join => "join",
            Self::Part => "part",
            Self::Kick => "kick",
            Self::Nick => "nick",
            Self::Whois => "whois",
        }
    }
}

/// One row of the forwarding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forward {
    pub from: ClientEventKind,
    pub to: EventKind,
}

const fn forward(from: ClientEventKind, to: EventKind) -> Forward {
    Forward { from, to }
}

/// Client events re-published verbatim on the bus. Anything not listed
/// (`ping`, `raw`) stays inside the network client.
pub const FORWARDS: &[Forward] = &[
    forward(ClientEventKind::Error, EventKind::Error),
    forward(ClientEventKind::Action, EventKind::Action),
    forward(ClientEventKind::Invite, EventKind::Invite),
    forward(ClientEventKind::Kill, EventKind::Kill),
    forward(ClientEventKind::Message, EventKind::Message),
    forward(ClientEventKind::ChannelMessage, EventKind::ChannelMessage),
    forward(ClientEventKind::ModeAdd, EventKind::ModeAdd),
    forward(ClientEventKind::ModeRemove, EventKind::ModeRemove),
    forward(ClientEventKind::Motd, EventKind::Motd),
    forward(ClientEventKind::Names, EventKind::Names),
    forward(ClientEventKind::Notice, EventKind::Notice),
    forward(ClientEventKind::Pm, EventKind::Pm),
    forward(ClientEventKind::Quit, EventKind::Quit),
    forward(ClientEventKind::Registered, EventKind::Register),
    forward(ClientEventKind::SelfMessage, EventKind::SelfEcho),
    forward(ClientEventKind::Topic, EventKind::Topic),
    forward(ClientEventKind::Join, EventKind::Join),
    forward(ClientEventKind::Part, EventKind::Part),
    forward(ClientEventKind::Kick, EventKind::Kick),
    forward(ClientEventKind::Nick, EventKind::Nick),
    forward(ClientEventKind::Whois, EventKind::Whois),
];

/// Bus name for a client event, if it is forwarded.
pub fn forward_target(kind: ClientEventKind) -> Option<EventKind> {
    FORWARDS.iter().find(|f| f.from == kind).map(|f| f.to)
}

/// An event as emitted by the network client.
///
/// `args` mirror the client's callback arguments; for [`ClientEventKind::Message`]
/// they are `[nick, to, text]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEvent {
    pub kind: ClientEventKind,
    pub args: Vec<String>,
    pub message: Option<RawMessage>,
}

impl ClientEvent {
    pub fn new<I, S>(kind: ClientEventKind, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            args: args.into_iter().map(Into::into).collect(),
            message: None,
        }
    }

    /// A chat message event.
    pub fn message(nick: &str, to: &str, text: &str, raw: Option<RawMessage>) -> Self {
        Self {
            kind: ClientEventKind::Message,
            args: vec![nick.to_string(), to.to_string(), text.to_string()],
            message: raw,
        }
    }

    pub fn with_message(mut self, raw: RawMessage) -> Self {
        self.message = Some(raw);
        self
    }

    /// The chat context of a message event.
    pub fn context(&self) -> Option<Context> {
        if self.kind != ClientEventKind::Message {
            return None;
        }
        let [nick, to, text, ..] = self.args.as_slice() else {
            return None;
        };
        let raw = self.message.as_ref();
        Some(Context {
            nick: nick.clone(),
            username: raw.and_then(|m| m.user.clone()).unwrap_or_default(),
            hostname: raw.and_then(|m| m.host.clone()).unwrap_or_default(),
            to: to.clone(),
            text: text.clone(),
            raw_message: self.message.clone(),
        })
    }
}

/// A client event re-published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedEvent {
    pub kind: EventKind,
    pub args: Vec<String>,
    pub message: Option<RawMessage>,
}

/// A parsed command line together with the message it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub context: Arc<Context>,
    pub name: String,
    pub args: Vec<String>,
}

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A protocol event from the forwarding table.
    Forwarded(ForwardedEvent),
    /// A chat line that parsed as a command.
    Command(CommandEvent),
    /// The bot finished connecting.
    Connected { server: String },
    /// The bot disconnected.
    Disconnected {
        server: String,
        reason: Option<String>,
    },
    /// The bot joined a channel.
    Joined { channel: String },
    /// The bot left a channel.
    Parted {
        channel: String,
        reason: Option<String>,
    },
    /// A notification published by a plugin.
    Plugin {
        source: String,
        name: String,
        args: Vec<String>,
    },
}

impl Event {
    /// Bus name of the event, for logs and filtering.
    pub fn name(&self) -> &str {
        match self {
            Self::Forwarded(e) => e.kind.as_str(),
            Self::Command(_) => "command",
            Self::Connected { .. } => "connect",
            Self::Disconnected { .. } => "disconnect",
            Self::Joined { .. } => "join",
            Self::Parted { .. } => "part",
            Self::Plugin { name, .. } => name.as_str(),
        }
    }

    pub fn as_command(&self) -> Option<&CommandEvent> {
        match self {
            Self::Command(cmd) => Some(cmd),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(cmd) => write!(f, "command {} ({} args)", cmd.name, cmd.args.len()),
            Self::Plugin { source, name, .. } => write!(f, "{}:{}", source, name),
            other => f.write_str(other.name()),
        }
    }
}

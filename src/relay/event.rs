//! Events consumed by a session.

/// Something that happened on a network connection, or a timer firing.
///
/// User fields carry the raw `nick!user@host` prefix; sessions format
/// them for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Registration finished (RPL_WELCOME) under `nickname`.
    Connected { nickname: String },
    /// The connection is gone.
    Disconnected { reason: String },
    /// The server confirmed our own JOIN.
    Joined { channel: String },
    /// We were kicked from `channel`.
    Kicked {
        channel: String,
        kicker: String,
        message: String,
    },
    /// PRIVMSG to a channel or to us.
    Privmsg {
        user: String,
        target: String,
        text: String,
    },
    /// CTCP ACTION (`/me`).
    Action {
        user: String,
        target: String,
        text: String,
    },
    UserJoined { user: String, channel: String },
    UserLeft { user: String, channel: String },
    UserQuit { user: String, message: String },
    UserRenamed { old: String, new: String },
    /// The server confirmed a change of our own nick.
    NickChanged { nickname: String },
    Notice {
        user: String,
        target: String,
        text: String,
    },
    /// Heartbeat interval elapsed.
    HeartbeatTick,
    /// Nick reclamation poll interval elapsed.
    ReclaimPoll,
}

//! Relay behavior variants.
//!
//! A network's `mode` selects a [`Behavior`], a set of independent
//! capability switches consulted by the session at each decision point.

use std::fmt;
use std::str::FromStr;

/// Mode selector from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Relays everything, including join/part noise.
    Default,
    /// Like `Default` without presence notices.
    SilentJoinPart,
    /// For networks that tag nicks with `_<digits>`.
    Flip,
    /// Reclaims the configured nick through NickServ.
    NickServ,
    /// NickServ reclamation, and never speaks on the channel.
    ReadOnly,
}

impl Mode {
    /// Get string representation, as written in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Default => "Default",
            Mode::SilentJoinPart => "SilentJoinPart",
            Mode::Flip => "FLIP",
            Mode::NickServ => "NickServ",
            Mode::ReadOnly => "ReadOnly",
        }
    }

    /// Capability set for this mode.
    pub fn behavior(&self) -> Behavior {
        let base = Behavior::default();
        match self {
            Mode::Default => base,
            Mode::SilentJoinPart => Behavior {
                relay_presence: false,
                ..base
            },
            Mode::Flip => Behavior {
                relay_presence: false,
                nick_format: NickFormat::StripNumericSuffix,
                ..base
            },
            Mode::NickServ => Behavior {
                relay_presence: false,
                reclaim: true,
                ..base
            },
            Mode::ReadOnly => Behavior {
                relay_presence: false,
                outbound: false,
                reclaim: true,
                ..base
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned for an unrecognised mode name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Default" => Ok(Mode::Default),
            "SilentJoinPart" => Ok(Mode::SilentJoinPart),
            "FLIP" => Ok(Mode::Flip),
            "NickServ" => Ok(Mode::NickServ),
            "ReadOnly" => Ok(Mode::ReadOnly),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// How raw nicks from the server are turned into display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NickFormat {
    /// Drop the `!user@host` part only.
    #[default]
    Plain,
    /// Also drop a trailing `_<digits>` tag.
    StripNumericSuffix,
}

impl NickFormat {
    /// Produce the display name for a raw nick or prefix.
    pub fn apply<'a>(&self, raw: &'a str) -> &'a str {
        let nick = strip_metadata(raw);
        match self {
            NickFormat::Plain => nick,
            NickFormat::StripNumericSuffix => strip_numeric_suffix(nick),
        }
    }
}

/// Capability switches making up a relay variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    /// Relay join/part/quit/rename notices.
    pub relay_presence: bool,
    /// Nick display strategy.
    pub nick_format: NickFormat,
    /// Allow messages to be sent on the channel.
    pub outbound: bool,
    /// Run the NickServ reclamation state machine.
    pub reclaim: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            relay_presence: true,
            nick_format: NickFormat::Plain,
            outbound: true,
            reclaim: false,
        }
    }
}

/// Strip the `!user@host` part of a prefix.
pub fn strip_metadata(raw: &str) -> &str {
    raw.split('!').next().unwrap_or(raw)
}

/// Strip trailing `_<digits>` tags. Nicks without digits after the
/// last underscore are returned unchanged.
///
/// Stacked tags (`bob_1_2`) are all removed so the result is stable.
pub fn strip_numeric_suffix(nick: &str) -> &str {
    let mut rest = nick;
    loop {
        let digits = rest.trim_end_matches(|c: char| c.is_ascii_digit());
        match digits.strip_suffix('_') {
            Some(base) if digits.len() < rest.len() && !base.is_empty() => rest = base,
            _ => return rest,
        }
    }
}

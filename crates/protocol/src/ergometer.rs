//! Ergometer serial command set
//!
//! ASCII commands terminated by a carriage return. Replies are CR-terminated
//! numeric or textual tokens.
//!
//! | Command | Reply |
//! |---|---|
//! | `power` | current power in watts |
//! | `pulse` | heart rate |
//! | `pedal` | cadence in rpm |
//! | `id` | model string, e.g. `LC7` |
//! | `servo` | servo mode (Novo only), e.g. `manual` |
//! | `power <load>` | sets the target load |

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line delimiter for commands and replies
pub const TERMINATOR: u8 = b'\r';

/// Substrings (lowercase) identifying a supported bike in an `id` reply
pub const KNOWN_SIGNATURES: [&str; 3] = ["lt", "lc", "novo"];

/// Servo mode that disables remote load control
pub const SERVO_MANUAL: &str = "manual";

/// A command understood by the bike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Power,
    Pulse,
    Pedal,
    Id,
    Servo,
    SetPower(u32),
}

impl Command {
    /// Bytes to write, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(TERMINATOR);
        bytes
    }

    /// Parse command text (terminator already stripped)
    ///
    /// ```
    /// use protocol::ergometer::Command;
    ///
    /// assert_eq!(Command::parse("power").unwrap(), Command::Power);
    /// assert_eq!(Command::parse("power 150").unwrap(), Command::SetPower(150));
    /// assert!(Command::parse("reboot").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text {
            "power" => return Ok(Self::Power),
            "pulse" => return Ok(Self::Pulse),
            "pedal" => return Ok(Self::Pedal),
            "id" => return Ok(Self::Id),
            "servo" => return Ok(Self::Servo),
            _ => {}
        }

        text.strip_prefix("power ")
            .and_then(|value| value.trim().parse().ok())
            .map(Self::SetPower)
            .ok_or_else(|| ProtocolError::UnknownCommand(text.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power => write!(f, "power"),
            Self::Pulse => write!(f, "pulse"),
            Self::Pedal => write!(f, "pedal"),
            Self::Id => write!(f, "id"),
            Self::Servo => write!(f, "servo"),
            Self::SetPower(load) => write!(f, "power {}", load),
        }
    }
}

/// Turn raw reply bytes into text with every terminator removed
pub fn normalize_reply(raw: &[u8]) -> String {
    let stripped: Vec<u8> = raw.iter().copied().filter(|b| *b != TERMINATOR).collect();
    String::from_utf8_lossy(&stripped).into_owned()
}

/// True if an `id` reply names a bike that speaks this protocol
pub fn is_known_signature(id_reply: &str) -> bool {
    let id = id_reply.to_lowercase();
    KNOWN_SIGNATURES.iter().any(|sig| id.contains(sig))
}

/// Model family, classified from the `id` reply prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Lt,
    Lc,
    Novo,
    Unknown,
}

impl ModelFamily {
    /// Classify by case-insensitive prefix
    pub fn classify(id_reply: &str) -> Self {
        let id = id_reply.trim().to_lowercase();
        if id.starts_with("lc") {
            Self::Lc
        } else if id.starts_with("novo") {
            Self::Novo
        } else if id.starts_with("lt") {
            Self::Lt
        } else {
            Self::Unknown
        }
    }

    /// Novo bikes report their servo mode separately
    pub fn needs_servo_query(self) -> bool {
        self == Self::Novo
    }

    /// Whether the bike accepts `power <load>`
    ///
    /// `servo` is the reply to the servo query, when one was made.
    pub fn can_control_power(self, servo: Option<&str>) -> bool {
        match self {
            Self::Lc => true,
            Self::Novo => servo.is_some_and(|mode| !mode.trim().eq_ignore_ascii_case(SERVO_MANUAL)),
            Self::Lt | Self::Unknown => false,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lt => "LT",
            Self::Lc => "LC",
            Self::Novo => "Novo",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Numeric value of a reply; anything unparseable reads as zero
pub fn parse_reading(reply: &str) -> u32 {
    reply.trim().parse().unwrap_or(0)
}

/// Power reading, saturated to 16 bits
pub fn parse_power(reply: &str) -> u16 {
    u16::try_from(parse_reading(reply)).unwrap_or(u16::MAX)
}

/// Pulse or cadence reading, saturated to 8 bits
pub fn parse_u8_reading(reply: &str) -> u8 {
    u8::try_from(parse_reading(reply)).unwrap_or(u8::MAX)
}

use std::fmt;

/// Kinds of entries the worker leaves in an item's `harvestLog`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Error,
    Warn,
    Info,
    MissingFont,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Error => "Error",
            LogKind::Warn => "Warn",
            LogKind::Info => "Info",
            LogKind::MissingFont => "MissingFont",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Error" => Some(LogKind::Error),
            "Warn" => Some(LogKind::Warn),
            "Info" => Some(LogKind::Info),
            "MissingFont" => Some(LogKind::MissingFont),
            _ => None,
        }
    }
}

/// One `"<Kind>: <message>"` line of an item's harvest log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Returns `None` for lines that are not in the entry format; older
    /// workers wrote free text into the same field.
    pub fn parse(line: &str) -> Option<Self> {
        let (kind, message) = line.split_once(':')?;
        let kind = LogKind::parse(kind.trim())?;
        Some(Self::new(kind, message.trim()))
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

//! Agent configuration.
//!
//! [`AgentConfig`] is the orchestrator's single knob bundle: which selection
//! to work with, which content target to offer or request, how many paste
//! requests to serve, and the timing/safety switches. The binary builds one
//! from its command line; embedders build one directly.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::chunk::ChunkPolicy;

/// Which selection the agent works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// The primary selection (mouse highlight / middle click).
    Primary,
    /// The rarely used secondary selection.
    Secondary,
    /// The clipboard selection (explicit copy / paste).
    Clipboard,
    /// The legacy cut-buffer mechanism. Recognized so callers get a precise
    /// error, but not supported: cut buffers are not selections.
    CutBuffer,
}

impl SelectionKind {
    /// The protocol-level name of the selection.
    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
            Self::Clipboard => "CLIPBOARD",
            Self::CutBuffer => "CUT_BUFFER0",
        }
    }
}

impl FromStr for SelectionKind {
    type Err = String;

    /// Accepts any unambiguous prefix of the selection names, the way the
    /// classic command-line tools do: `p`, `pri`, `clip`, and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.is_empty() {
            return Err("empty selection name".to_owned());
        }
        let candidates: [(&str, SelectionKind); 4] = [
            ("primary", Self::Primary),
            ("secondary", Self::Secondary),
            ("clipboard", Self::Clipboard),
            ("buffer-cut", Self::CutBuffer),
        ];
        let matches: Vec<SelectionKind> = candidates
            .iter()
            .filter(|(name, _)| name.starts_with(&lower))
            .map(|(_, kind)| *kind)
            .collect();
        match matches.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(format!("unknown selection '{s}'")),
            _ => Err(format!("ambiguous selection '{s}'")),
        }
    }
}

/// Which content format to offer or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// UTF-8 text, the default. Fetches fall back to [`TargetSpec::PlainText`]
    /// once when the owner refuses, unless the fallback is disabled.
    Utf8Text,
    /// Legacy Latin-1 text.
    PlainText,
    /// An arbitrary target named by the caller (a MIME type, `TIMESTAMP`...).
    Custom(String),
}

impl TargetSpec {
    /// The atom name for this target.
    pub fn atom_name(&self) -> &str {
        match self {
            Self::Utf8Text => "UTF8_STRING",
            Self::PlainText => "STRING",
            Self::Custom(name) => name,
        }
    }
}

/// Everything the orchestrator needs to run one serve or fetch session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The selection to own or to fetch.
    pub selection: SelectionKind,
    /// The content target to offer or request.
    pub target: TargetSpec,
    /// Number of paste requests to serve before releasing ownership.
    /// Zero means serve until ownership is lost.
    pub loops: u64,
    /// Give up after this long without any protocol event. `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
    /// Zero the payload buffer when the serving session ends.
    pub sensitive: bool,
    /// Drop a single trailing newline from the input payload.
    pub trim_trailing_newline: bool,
    /// Never fall back from UTF-8 to legacy text when a fetch is refused.
    pub disable_fallback: bool,
    /// Incremental chunk sizing.
    pub chunk: ChunkPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            selection: SelectionKind::Primary,
            target: TargetSpec::Utf8Text,
            loops: 1,
            idle_timeout: None,
            sensitive: false,
            trim_trailing_newline: false,
            disable_fallback: false,
            chunk: ChunkPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_prefixes_parse() {
        assert_eq!("p".parse::<SelectionKind>(), Ok(SelectionKind::Primary));
        assert_eq!("PRIM".parse::<SelectionKind>(), Ok(SelectionKind::Primary));
        assert_eq!("sec".parse::<SelectionKind>(), Ok(SelectionKind::Secondary));
        assert_eq!(
            "clipboard".parse::<SelectionKind>(),
            Ok(SelectionKind::Clipboard)
        );
        assert_eq!("b".parse::<SelectionKind>(), Ok(SelectionKind::CutBuffer));
    }

    #[test]
    fn bad_selection_names_are_rejected() {
        assert!("".parse::<SelectionKind>().is_err());
        assert!("tertiary".parse::<SelectionKind>().is_err());
    }

    #[test]
    fn target_atom_names() {
        assert_eq!(TargetSpec::Utf8Text.atom_name(), "UTF8_STRING");
        assert_eq!(TargetSpec::PlainText.atom_name(), "STRING");
        assert_eq!(
            TargetSpec::Custom("image/png".into()).atom_name(),
            "image/png"
        );
    }
}

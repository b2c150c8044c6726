//! Raw turn items and approval modes.
//!
//! A `TurnItem` is what the adapter yields while executing one turn. The
//! scheduler translates items into canonical events; adapters never touch
//! the event log directly.

use serde::{Deserialize, Serialize};

// ============================================================================
// Turn items
// ============================================================================

/// One item from an adapter's turn stream, tagged by `item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TurnItem {
    /// Start marker: adapter identity and model info.
    Header {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },

    /// Intermediate step output (tool call, thinking, partial work).
    Step { stream: String, text: String },

    /// The turn's terminal answer.
    Final { text: String },

    /// Token usage summary, typically the last item of a successful turn.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
    },

    /// Terminal error marker. The adapter stops yielding after this.
    Fatal { code: String, message: String },
}

// ============================================================================
// Approval mode
// ============================================================================

/// How much autonomy the agent gets, as an ordinal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Agent suggests; every action needs approval.
    Suggest,
    /// Edits are auto-approved, everything else asks.
    AcceptEdits,
    /// Fully autonomous.
    FullAuto,
}

impl ApprovalMode {
    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Suggest),
            1 => Some(Self::AcceptEdits),
            2 => Some(Self::FullAuto),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Suggest => 0,
            Self::AcceptEdits => 1,
            Self::FullAuto => 2,
        }
    }
}

impl Default for ApprovalMode {
    fn default() -> Self {
        Self::AcceptEdits
    }
}

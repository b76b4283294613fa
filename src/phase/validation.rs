//! Validation verdicts.
//!
//! Rejections are data, not errors: a verdict carries the rejection class
//! and the ordered list of reasons shown to the player.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    /// The action breaks a rule.
    ValidationRejected,
    /// The action references a unit or model that does not exist.
    NotFound,
    /// The payload is missing fields or carries invalid values.
    MalformedPayload,
}

impl RejectionKind {
    pub const fn name(self) -> &'static str {
        match self {
            RejectionKind::ValidationRejected => "VALIDATION_REJECTED",
            RejectionKind::NotFound => "NOT_FOUND",
            RejectionKind::MalformedPayload => "MALFORMED_PAYLOAD",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verdict on a proposed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RejectionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult { valid: true, kind: None, reasons: Vec::new() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::with_kind(RejectionKind::ValidationRejected, vec![reason.into()])
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::with_kind(RejectionKind::NotFound, vec![reason.into()])
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::with_kind(RejectionKind::MalformedPayload, vec![reason.into()])
    }

    fn with_kind(kind: RejectionKind, reasons: Vec<String>) -> Self {
        ValidationResult { valid: false, kind: Some(kind), reasons }
    }
}

/// Collects rule failures so a single verdict can list all of them.
#[derive(Debug, Default)]
pub struct Checks {
    reasons: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Checks::default()
    }

    /// Records `reason` unless `condition` holds.
    pub fn require(&mut self, condition: bool, reason: impl FnOnce() -> String) -> &mut Self {
        if !condition {
            self.reasons.push(reason());
        }
        self
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn finish(self) -> ValidationResult {
        if self.reasons.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::with_kind(RejectionKind::ValidationRejected, self.reasons)
        }
    }
}

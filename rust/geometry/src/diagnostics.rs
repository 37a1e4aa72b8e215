// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Import log.
//!
//! Every recoverable problem is recorded against the id of the entity it
//! came from and mirrored to `tracing`. The log is returned with the import
//! result so callers can list what was skipped, downgraded or dropped.

use std::fmt;

/// How much of the source data survived
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Silently corrected in place
    Comment,
    /// Part of the entity was dropped or downgraded
    Warning,
    /// The entity or one of its geometry contributions was not produced
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Entity type is not imported
    SkippedEntity,
    /// Construction of the entity failed
    InvalidEntity,
    /// Vertices merged, points projected, basis vectors repaired
    AutoCorrection,
    /// A face bound loop was rejected
    InvalidLoop,
    /// An inner bound (hole) was dropped from a face
    DroppedHole,
    /// A face declares more than one outer bound
    DuplicateOuterBound,
    /// A face could not be added to its shell
    InvalidFace,
    /// Fewer faces were built than the shell declares
    FaceCountShortfall,
    /// Shell was rebuilt with the permissive mesh builder
    MeshFallback,
    /// The second operand of a Boolean could not be resolved
    DroppedOperand,
    /// A Boolean succeeded only after shifting its second operand
    BooleanRetry,
    /// A Boolean failed in every attempt
    BooleanFailed,
    /// An opening could not be cut from its host
    VoidNotCut,
    /// Geometry could not be produced for a representation item
    NoGeometry,
    /// A reference cycle was cut
    ReferenceCycle,
}

/// One log entry
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub entity_id: u32,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] #{} {:?}: {}",
            self.severity, self.entity_id, self.kind, self.message
        )
    }
}

/// Ordered list of diagnostics for one import
#[derive(Debug, Clone, Default)]
pub struct ImportLog {
    entries: Vec<Diagnostic>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        entity_id: u32,
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Comment => {
                tracing::debug!(entity_id, kind = ?kind, "{}", message)
            }
            Severity::Warning => {
                tracing::warn!(entity_id, kind = ?kind, "{}", message)
            }
            Severity::Error => {
                tracing::error!(entity_id, kind = ?kind, "{}", message)
            }
        }
        self.entries.push(Diagnostic {
            entity_id,
            severity,
            kind,
            message,
        });
    }

    pub fn comment(&mut self, entity_id: u32, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(entity_id, Severity::Comment, kind, message);
    }

    pub fn warning(&mut self, entity_id: u32, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(entity_id, Severity::Warning, kind, message);
    }

    pub fn error(&mut self, entity_id: u32, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(entity_id, Severity::Error, kind, message);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.of_kind(kind).next().is_some()
    }

    pub fn for_entity(&self, entity_id: u32) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.entity_id == entity_id)
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity >= severity).count()
    }
}

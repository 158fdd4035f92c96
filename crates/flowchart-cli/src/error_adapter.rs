//! Error adapter for converting FlowchartError to miette diagnostics.
//!
//! This module provides the bridge between the library's standard error type
//! and miette's rich diagnostic formatting used in the CLI.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan};

use flowchart::FlowchartError;

/// Adapter giving a [`FlowchartError`] a diagnostic code and a hint.
pub struct ErrorAdapter<'a>(pub &'a FlowchartError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            FlowchartError::Io(_) => "flowchart::io",
            FlowchartError::Serialization(_) => "flowchart::serialization",
            FlowchartError::InvalidId { .. } => "flowchart::invalid_id",
            FlowchartError::UnknownType(_) => "flowchart::unknown_type",
            FlowchartError::UnknownElement(_) => "flowchart::unknown_element",
            FlowchartError::InvalidRelation(_) => "flowchart::invalid_relation",
            FlowchartError::InvalidReference(_) => "flowchart::invalid_reference",
            FlowchartError::InvalidValue { .. } => "flowchart::invalid_value",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match &self.0 {
            FlowchartError::InvalidId { .. } => {
                "`.` and `:` separate node and port in references; use another character"
            }
            FlowchartError::InvalidReference(_) => "references look like `node` or `node.port`",
            FlowchartError::Serialization(_) => {
                "the input must be a JSON array of element descriptors"
            }
            _ => return None,
        };
        Some(Box::new(help))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = FlowchartError::UnknownType("gate".to_string());
        let adapter = ErrorAdapter(&err);
        assert_eq!(adapter.code().unwrap().to_string(), "flowchart::unknown_type");
        assert!(adapter.help().is_none());
        assert_eq!(adapter.to_string(), "Unknown element type `gate`");
    }

    #[test]
    fn test_help_for_invalid_id() {
        let err = FlowchartError::InvalidId {
            id: "a.b".to_string(),
            ch: '.',
        };
        let adapter = ErrorAdapter(&err);
        assert_eq!(adapter.code().unwrap().to_string(), "flowchart::invalid_id");
        assert!(adapter.help().unwrap().to_string().contains("separate"));
    }

    #[test]
    fn test_renders_report() {
        let err = FlowchartError::invalid_value("lineShape", "unknown shape `zigzag`");
        let mut out = String::new();
        miette::GraphicalReportHandler::new_themed(miette::GraphicalTheme::unicode_nocolor())
            .render_report(&mut out, &ErrorAdapter(&err))
            .unwrap();
        assert!(out.contains("flowchart::invalid_value"));
        assert!(out.contains("lineShape"));
    }
}

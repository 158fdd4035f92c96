//! Parsing of element ids, endpoint references and repeatable port names.
//!
//! Relations refer to their endpoints as `node` or `node.port`, which is why
//! `.` (and `:`, reserved for namespacing) may not appear in element ids.
//! Repeatable port templates use `*` as the index placeholder, e.g. `in*`
//! materializes as `in1`, `in2`, ...

use winnow::{
    Parser as _,
    ascii::digit1,
    combinator::{delimited, opt, preceded},
    error::{ContextError, ErrMode},
    token::{literal, rest, take_till},
};

use crate::error::FlowchartError;

type IResult<O> = Result<O, ErrMode<ContextError>>;

/// Characters that may not appear in an element id.
pub const RESERVED_ID_CHARS: [char; 2] = ['.', ':'];

/// Checks that `id` can be used as an element id.
///
/// # Errors
///
/// Returns [`FlowchartError::InvalidId`] if the id contains `.` or `:`, and
/// [`FlowchartError::InvalidValue`] if it is empty.
pub fn validate_id(id: &str) -> Result<(), FlowchartError> {
    if id.is_empty() {
        return Err(FlowchartError::invalid_value("id", "element id is empty"));
    }
    match id.chars().find(|c| RESERVED_ID_CHARS.contains(c)) {
        Some(ch) => Err(FlowchartError::InvalidId {
            id: id.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

/// A parsed `node[.port]` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointRef<'a> {
    node: &'a str,
    port: Option<&'a str>,
}

impl<'a> EndpointRef<'a> {
    pub fn node(&self) -> &'a str {
        self.node
    }

    pub fn port(&self) -> Option<&'a str> {
        self.port
    }
}

fn node_part<'s>(input: &mut &'s str) -> IResult<&'s str> {
    take_till(1.., '.').parse_next(input)
}

fn port_part<'s>(input: &mut &'s str) -> IResult<Option<&'s str>> {
    opt(preceded('.', rest)).parse_next(input)
}

/// Parses an endpoint reference such as `start` or `judge.right1`.
///
/// An empty suffix (`node.`) is treated as no port.
///
/// # Errors
///
/// Returns [`FlowchartError::InvalidReference`] when there is no node part.
///
/// # Examples
///
/// ```
/// # use flowchart::reference::parse_endpoint;
/// let endpoint = parse_endpoint("judge.right1").unwrap();
/// assert_eq!(endpoint.node(), "judge");
/// assert_eq!(endpoint.port(), Some("right1"));
///
/// assert_eq!(parse_endpoint("start").unwrap().port(), None);
/// assert!(parse_endpoint(".port").is_err());
/// ```
pub fn parse_endpoint(reference: &str) -> Result<EndpointRef<'_>, FlowchartError> {
    let mut input = reference;
    let parsed: IResult<_> = (node_part, port_part).parse_next(&mut input);
    match parsed {
        Ok((node, port)) if input.is_empty() => Ok(EndpointRef {
            node,
            port: port.filter(|p| !p.is_empty()),
        }),
        _ => Err(FlowchartError::InvalidReference(reference.to_string())),
    }
}

/// Name pattern of a repeatable port template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestPattern {
    prefix: String,
    suffix: String,
}

impl RestPattern {
    /// Splits a template name at its `*`; returns `None` for plain names.
    pub fn new(template: &str) -> Option<Self> {
        template.split_once('*').map(|(prefix, suffix)| Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Returns the number substituted for `*` if `name` matches this pattern.
    ///
    /// ```
    /// # use flowchart::reference::RestPattern;
    /// let pattern = RestPattern::new("case*").unwrap();
    /// assert_eq!(pattern.number_of("case12"), Some(12));
    /// assert_eq!(pattern.number_of("case"), None);
    /// assert_eq!(pattern.number_of("case1x"), None);
    /// ```
    pub fn number_of(&self, name: &str) -> Option<u32> {
        let mut input = name;
        let parsed: IResult<&str> = delimited(
            literal(self.prefix.as_str()),
            digit1,
            literal(self.suffix.as_str()),
        )
        .parse_next(&mut input);
        match parsed {
            Ok(digits) if input.is_empty() => digits.parse().ok(),
            _ => None,
        }
    }

    /// Builds the concrete name for `number`.
    pub fn name_for(&self, number: u32) -> String {
        format!("{}{}{}", self.prefix, number, self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("start").is_ok());
        assert!(validate_id("node-1_a").is_ok());
        assert!(matches!(
            validate_id("a.b"),
            Err(FlowchartError::InvalidId { ch: '.', .. })
        ));
        assert!(matches!(
            validate_id("ns:a"),
            Err(FlowchartError::InvalidId { ch: ':', .. })
        ));
        assert!(validate_id("").is_err());
    }

    #[test]
    fn test_parse_endpoint_variants() {
        let plain = parse_endpoint("a").unwrap();
        assert_eq!(plain.node(), "a");
        assert_eq!(plain.port(), None);

        let with_port = parse_endpoint("a.top1").unwrap();
        assert_eq!(with_port.node(), "a");
        assert_eq!(with_port.port(), Some("top1"));

        let trailing_dot = parse_endpoint("a.").unwrap();
        assert_eq!(trailing_dot.port(), None);

        assert!(parse_endpoint("").is_err());
    }

    #[test]
    fn test_rest_pattern_with_suffix() {
        let pattern = RestPattern::new("in*x").unwrap();
        assert_eq!(pattern.number_of("in3x"), Some(3));
        assert_eq!(pattern.number_of("in3"), None);
        assert_eq!(pattern.name_for(7), "in7x");
    }

    #[test]
    fn test_rest_pattern_requires_star() {
        assert!(RestPattern::new("plain").is_none());
    }

    #[test]
    fn test_rest_pattern_rejects_other_prefix() {
        let pattern = RestPattern::new("out*").unwrap();
        assert_eq!(pattern.number_of("in1"), None);
    }
}

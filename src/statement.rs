//! Flat n-ary statement syntax: `Predicate(arg1, arg2, ...).`
//!
//! Parsing is deliberately naive: the body between the first `(` and the last
//! `)` is split on raw commas. Arguments containing commas or parentheses are
//! not supported and will be split incorrectly; downstream tools rely on this
//! exact behaviour.

use serde::{Deserialize, Serialize};

/// Result of parsing a statement string.
///
/// An empty `predicate` means the input was unparseable; callers must check
/// [`ParsedStatement::is_parseable`] before using it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub predicate: String,
    pub arguments: Vec<String>,
}

impl ParsedStatement {
    /// Whether the input had the `Predicate(args)` shape.
    pub fn is_parseable(&self) -> bool {
        !self.predicate.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    /// Canonical stored form: `Predicate(a1, a2).`
    pub fn canonical(&self) -> String {
        format!("{}({}).", self.predicate, self.arguments.join(", "))
    }

    /// Coarse knowledge domain of the predicate.
    pub fn domain(&self) -> Domain {
        Domain::infer(&self.predicate)
    }
}

/// Parse `Predicate(arg1, arg2, ...)` into its parts.
///
/// Never fails: malformed input yields an empty predicate and no arguments.
pub fn parse(statement: &str) -> ParsedStatement {
    let (Some(open), Some(close)) = (statement.find('('), statement.rfind(')')) else {
        return ParsedStatement::default();
    };
    if close < open {
        return ParsedStatement::default();
    }

    let predicate = statement[..open].trim();
    if predicate.is_empty() {
        return ParsedStatement::default();
    }

    let arguments = statement[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(String::from)
        .collect();

    ParsedStatement {
        predicate: predicate.to_string(),
        arguments,
    }
}

// ---------------------------------------------------------------------------
// Domain inference
// ---------------------------------------------------------------------------

/// Knowledge domain recorded alongside each stored fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Ontology,
    Causality,
    Mereology,
    Spatial,
    General,
}

impl Domain {
    pub fn infer(predicate: &str) -> Self {
        match predicate {
            "IsA" | "IsTypeOf" | "TypeOf" => Self::Ontology,
            "Causes" | "CausedBy" | "Requires" => Self::Causality,
            "HasPart" | "PartOf" | "ConsistsOf" => Self::Mereology,
            "LocatedAt" | "LocatedIn" | "HasLocation" => Self::Spatial,
            _ => Self::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ontology => "ontology",
            Self::Causality => "causality",
            Self::Mereology => "mereology",
            Self::Spatial => "spatial",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Schema limits
// ---------------------------------------------------------------------------

/// Size limits a parsed statement must respect before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaLimits {
    #[serde(default = "default_max_predicate_len")]
    pub max_predicate_len: usize,
    #[serde(default = "default_max_arg_len")]
    pub max_arg_len: usize,
    #[serde(default = "default_max_arg_count")]
    pub max_arg_count: usize,
}

fn default_max_predicate_len() -> usize {
    100
}
fn default_max_arg_len() -> usize {
    500
}
fn default_max_arg_count() -> usize {
    10
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            max_predicate_len: default_max_predicate_len(),
            max_arg_len: default_max_arg_len(),
            max_arg_count: default_max_arg_count(),
        }
    }
}

impl SchemaLimits {
    /// Describe the first limit `parsed` breaks, if any.
    pub fn violation(&self, parsed: &ParsedStatement) -> Option<String> {
        let pred_len = parsed.predicate.chars().count();
        if pred_len > self.max_predicate_len {
            return Some(format!(
                "predicate too long: {pred_len} > {} chars",
                self.max_predicate_len
            ));
        }
        if parsed.arity() > self.max_arg_count {
            return Some(format!(
                "too many arguments: {} > {}",
                parsed.arity(),
                self.max_arg_count
            ));
        }
        parsed
            .arguments
            .iter()
            .enumerate()
            .find(|(_, arg)| arg.chars().count() > self.max_arg_len)
            .map(|(i, arg)| {
                format!(
                    "argument {} too long: {} > {} chars",
                    i + 1,
                    arg.chars().count(),
                    self.max_arg_len
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_fact() {
        let p = parse("IsA(TestEntity, Entity).");
        assert_eq!(p.predicate, "IsA");
        assert_eq!(p.arguments, vec!["TestEntity", "Entity"]);
        assert!(p.is_parseable());
    }

    #[test]
    fn round_trips_arity_zero_through_seven() {
        let args = ["A", "b_2", "Carbon", "x", "Y_long_name", "z9", "Q"];
        for predicate in ["P", "HasPart", "causes_effect", "Rel42"] {
            for n in 0..=7 {
                let list: Vec<String> = args[..n].iter().map(|s| s.to_string()).collect();
                let text = format!("{predicate}({}).", list.join(", "));
                let p = parse(&text);
                assert_eq!(p.predicate, predicate, "input {text}");
                assert_eq!(p.arguments, list, "input {text}");
                assert_eq!(p.canonical(), text);
            }
        }
    }

    #[test]
    fn missing_parens_is_unparseable() {
        assert!(!parse("JustAWord").is_parseable());
        assert!(!parse("Open(a, b").is_parseable());
        assert!(!parse("Closeda, b)").is_parseable());
        assert!(parse("").arguments.is_empty());
    }

    #[test]
    fn closing_before_opening_is_unparseable() {
        let p = parse("Bad)a, b(");
        assert_eq!(p, ParsedStatement::default());
    }

    #[test]
    fn empty_predicate_is_unparseable() {
        assert!(!parse("  (a, b).").is_parseable());
    }

    #[test]
    fn trims_and_drops_empty_pieces() {
        let p = parse("  Uses ( A ,  , B , ) ");
        assert_eq!(p.predicate, "Uses");
        assert_eq!(p.arguments, vec!["A", "B"]);
    }

    #[test]
    fn nested_parens_split_naively() {
        // Known limitation: inner commas are not protected.
        let p = parse("Formula(f(x, y), z).");
        assert_eq!(p.predicate, "Formula");
        assert_eq!(p.arguments, vec!["f(x", "y)", "z"]);
    }

    #[test]
    fn canonical_normalizes_spacing_and_period() {
        assert_eq!(parse("IsA(A,B)").canonical(), "IsA(A, B).");
        assert_eq!(parse("IsA( A , B ).").canonical(), "IsA(A, B).");
    }

    #[test]
    fn domain_inference() {
        assert_eq!(Domain::infer("IsA"), Domain::Ontology);
        assert_eq!(Domain::infer("CausedBy"), Domain::Causality);
        assert_eq!(Domain::infer("ConsistsOf"), Domain::Mereology);
        assert_eq!(Domain::infer("LocatedIn"), Domain::Spatial);
        assert_eq!(Domain::infer("Orbits"), Domain::General);
        assert_eq!(Domain::Spatial.to_string(), "spatial");
    }

    #[test]
    fn schema_limits_report_first_violation() {
        let limits = SchemaLimits {
            max_predicate_len: 5,
            max_arg_len: 3,
            max_arg_count: 2,
        };
        assert!(limits.violation(&parse("IsA(a, b)")).is_none());
        assert!(limits
            .violation(&parse("TooLongPred(a)"))
            .unwrap()
            .contains("predicate too long"));
        assert!(limits
            .violation(&parse("IsA(a, b, c)"))
            .unwrap()
            .contains("too many arguments"));
        assert!(limits
            .violation(&parse("IsA(a, long)"))
            .unwrap()
            .contains("argument 2"));
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CnfError {
    #[error("missing `p cnf <vars> <clauses>` header")]
    MissingHeader,

    #[error("line {line}: malformed header `{text}`")]
    InvalidHeader { line: usize, text: String },

    #[error("line {line}: `{token}` is not a literal")]
    InvalidLiteral { line: usize, token: String },

    #[error("line {line}: literal {literal} exceeds the {num_vars} declared variables")]
    VariableOutOfRange {
        line: usize,
        literal: i64,
        num_vars: u32,
    },
}

/// A formula in conjunctive normal form, DIMACS-style literals (`-3` is "not x3").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cnf {
    pub num_vars: u32,
    pub clauses: Vec<Vec<i32>>,
}

impl Cnf {
    pub fn new(num_vars: u32, clauses: Vec<Vec<i32>>) -> Self {
        Self { num_vars, clauses }
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn has_empty_clause(&self) -> bool {
        self.clauses.iter().any(|clause| clause.is_empty())
    }

    /// The same formula with each literal of `assumptions` added as a unit clause.
    pub fn with_assumptions(&self, assumptions: &[i32]) -> Cnf {
        let mut clauses = self.clauses.clone();
        clauses.extend(assumptions.iter().map(|&lit| vec![lit]));
        Cnf::new(self.num_vars, clauses)
    }

    pub fn from_file(path: &Path) -> Result<Cnf> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read problem file `{}`", path.display()))?;
        Cnf::parse_dimacs(&text)
            .with_context(|| format!("Could not parse problem file `{}`", path.display()))
    }

    /// Parses DIMACS CNF text. Clauses may span lines; a `%` line ends the
    /// formula, as in the SATLIB benchmark files.
    pub fn parse_dimacs(text: &str) -> Result<Cnf, CnfError> {
        let mut header: Option<(u32, usize)> = None;
        let mut clauses = Vec::new();
        let mut current = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            if line.starts_with('%') {
                break;
            }
            if line.starts_with('p') {
                header = Some(parse_header(line, line_no)?);
                continue;
            }

            let Some((num_vars, _)) = header else {
                return Err(CnfError::MissingHeader);
            };

            for token in line.split_whitespace() {
                let literal: i64 = token.parse().map_err(|_| CnfError::InvalidLiteral {
                    line: line_no,
                    token: token.to_string(),
                })?;

                if literal == 0 {
                    clauses.push(std::mem::take(&mut current));
                    continue;
                }
                if literal.unsigned_abs() > num_vars as u64 {
                    return Err(CnfError::VariableOutOfRange {
                        line: line_no,
                        literal,
                        num_vars,
                    });
                }
                let literal = i32::try_from(literal).map_err(|_| CnfError::InvalidLiteral {
                    line: line_no,
                    token: token.to_string(),
                })?;
                current.push(literal);
            }
        }

        let Some((num_vars, declared_clauses)) = header else {
            return Err(CnfError::MissingHeader);
        };

        if !current.is_empty() {
            clauses.push(current);
        }
        if clauses.len() != declared_clauses {
            tracing::warn!(
                "Header declares {} clauses but {} were read",
                declared_clauses,
                clauses.len()
            );
        }

        Ok(Cnf::new(num_vars, clauses))
    }
}

fn parse_header(line: &str, line_no: usize) -> Result<(u32, usize), CnfError> {
    let invalid = || CnfError::InvalidHeader {
        line: line_no,
        text: line.to_string(),
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["p", "cnf", vars, clauses] => {
            let vars: u32 = vars.parse().map_err(|_| invalid())?;
            let clauses = clauses.parse().map_err(|_| invalid())?;
            // Literals are stored as `i32`.
            if vars > i32::MAX as u32 {
                return Err(invalid());
            }
            Ok((vars, clauses))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_formula() {
        let text = "c example\np cnf 3 2\n1 -3 0\n2 3 -1 0\n";
        let cnf = Cnf::parse_dimacs(text).unwrap();

        assert_eq!(cnf.num_vars, 3);
        assert_eq!(cnf.clauses, vec![vec![1, -3], vec![2, 3, -1]]);
    }

    #[test]
    fn test_clauses_may_span_lines() {
        let text = "p cnf 4 2\n1 2\n3 0 -4\n0\n%\n0\n";
        let cnf = Cnf::parse_dimacs(text).unwrap();

        assert_eq!(cnf.clauses, vec![vec![1, 2, 3], vec![-4]]);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        assert_eq!(Cnf::parse_dimacs("1 2 0\n"), Err(CnfError::MissingHeader));
        assert_eq!(Cnf::parse_dimacs("c only comments\n"), Err(CnfError::MissingHeader));
        assert!(matches!(
            Cnf::parse_dimacs("p dnf 2 1\n"),
            Err(CnfError::InvalidHeader { line: 1, .. })
        ));
        assert!(matches!(
            Cnf::parse_dimacs("p cnf 2 1\n1 x 0\n"),
            Err(CnfError::InvalidLiteral { line: 2, .. })
        ));
        assert!(matches!(
            Cnf::parse_dimacs("p cnf 2 1\n1 3 0\n"),
            Err(CnfError::VariableOutOfRange { line: 2, literal: 3, .. })
        ));
    }

    #[test]
    fn test_variables_beyond_literal_range_are_rejected() {
        assert!(matches!(
            Cnf::parse_dimacs("p cnf 3000000000 1\n3000000000 0\n"),
            Err(CnfError::InvalidHeader { line: 1, .. })
        ));

        let largest = format!("p cnf {max} 1\n{max} -{max} 0\n", max = i32::MAX);
        let cnf = Cnf::parse_dimacs(&largest).unwrap();
        assert_eq!(cnf.clauses, vec![vec![i32::MAX, -i32::MAX]]);
    }

    #[test]
    fn test_assumptions_become_unit_clauses() {
        let cnf = Cnf::new(2, vec![vec![1, 2]]);
        let cube = cnf.with_assumptions(&[-1, 2]);

        assert_eq!(cube.clauses, vec![vec![1, 2], vec![-1], vec![2]]);
        assert_eq!(cube.num_vars, 2);
    }
}

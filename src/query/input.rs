//! Interpretation of the free-text query string.

use regex::Regex;

use crate::{err::LookupError, rsid::Rsid, variant::Variant};

lazy_static::lazy_static! {
    static ref LINE_SEP: Regex = Regex::new(r"[\r\n]+").expect("invalid regex in source code");
    static ref FIELD_SEP: Regex = Regex::new(r"[\s,]+").expect("invalid regex in source code");
}

/// How the query lines are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum QueryMode {
    /// Bare list of variant or rsID tokens.
    Single,
    /// One `token, weight[, label]` triple per line.
    Group,
}

/// One input token with its weight and optional label.
#[derive(Debug, Clone, PartialEq)]
pub struct InputItem {
    pub token: String,
    pub beta: f64,
    pub value: Option<String>,
}

/// Result of parsing the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub mode: QueryMode,
    pub items: Vec<InputItem>,
}

impl ParsedQuery {
    /// Whether the items carry a free-text label.
    pub fn has_custom_values(&self) -> bool {
        self.items
            .first()
            .map(|item| item.value.is_some())
            .unwrap_or(false)
    }
}

fn non_empty_lines(query: &str) -> Vec<&str> {
    LINE_SEP
        .split(query.trim())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Parse the query string into single or group mode.
///
/// The mode is decided by the number of fields on the first line.
pub fn parse_query(query: &str) -> Result<ParsedQuery, LookupError> {
    let query = query.trim();
    let lines: Vec<&str> = LINE_SEP.split(query).collect();
    let n_first = lines
        .first()
        .map(|line| FIELD_SEP.split(line).count())
        .unwrap_or_default();

    let parsed = if n_first > 1 {
        let mut items = Vec::new();
        for line in &lines {
            let fields: Vec<&str> = FIELD_SEP.split(line).collect();
            if fields[0].is_empty() {
                continue;
            }
            let beta = fields.get(1).ok_or_else(|| {
                LookupError::Validation(
                    "Oops, I cannot parse that. Try providing either one variant per line or all \
                     variants in one line separated by space or comma. Or variant, beta, and \
                     optionally any custom value separated by space or comma on each line."
                        .into(),
                )
            })?;
            let beta: f64 = beta.parse().map_err(|_| {
                LookupError::Validation(format!(
                    "Oops, I cannot parse that. Looks like some beta value is not numeric in \
                     the input: {}",
                    beta
                ))
            })?;
            let value = if n_first > 2 {
                Some(
                    fields
                        .get(2)
                        .ok_or_else(|| {
                            LookupError::Validation(format!(
                                "Oops, I cannot parse that. Missing custom value for {}",
                                fields[0]
                            ))
                        })?
                        .to_string(),
                )
            } else {
                None
            };
            items.push(InputItem {
                token: fields[0].to_string(),
                beta,
                value,
            });
        }
        ParsedQuery {
            mode: QueryMode::Group,
            items,
        }
    } else {
        let mut tokens: Vec<&str> = Vec::new();
        for line in &lines {
            for token in FIELD_SEP.split(line) {
                if !token.is_empty() && !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        ParsedQuery {
            mode: QueryMode::Single,
            items: tokens
                .into_iter()
                .map(|token| InputItem {
                    token: token.to_string(),
                    beta: 0.0,
                    value: None,
                })
                .collect(),
        }
    };

    if parsed.items.is_empty() {
        return Err(LookupError::Validation("empty query".into()));
    }
    Ok(parsed)
}

/// Whether the query is a single gene symbol rather than variants.
pub fn looks_like_a_gene(query: &str) -> bool {
    let lines = non_empty_lines(query);
    let [line] = lines.as_slice() else {
        return false;
    };
    let fields: Vec<&str> = FIELD_SEP
        .split(line.trim())
        .filter(|field| !field.is_empty())
        .collect();
    let [token] = fields.as_slice() else {
        return false;
    };
    token.parse::<Variant>().is_err() && token.parse::<Rsid>().is_err()
}

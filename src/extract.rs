//! Declarative lookup of result text and token counts in provider responses.
//!
//! Paths use a small grammar: dotted object keys with optional bracketed
//! array indices, e.g. `choices[0].message.content`. A leading `$` or `$.`
//! is accepted and ignored.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::usage::TokenUsage;

pub const DEFAULT_RESULT_PATH: &str = "choices[0].message.content";
pub const DEFAULT_INPUT_TOKENS_PATH: &str = "usage.prompt_tokens";
pub const DEFAULT_OUTPUT_TOKENS_PATH: &str = "usage.completion_tokens";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
}

/// A parsed field path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    steps: Vec<Step>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |why: &str| Error::config(format!("invalid field path `{}`: {}", raw, why));

        let trimmed = raw.trim();
        let body = match trimmed.strip_prefix('$') {
            Some(rest) => rest.strip_prefix('.').unwrap_or(rest),
            None => trimmed,
        };
        if body.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut steps = Vec::new();
        for segment in body.split('.') {
            let (key, mut rest) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };
            if key.contains(']') {
                return Err(invalid("unbalanced `]`"));
            }
            if !key.is_empty() {
                steps.push(Step::Key(key.to_string()));
            } else if rest.is_empty() {
                return Err(invalid("empty segment"));
            }

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .ok_or_else(|| invalid("expected `[` after index"))?;
                let close = inner.find(']').ok_or_else(|| invalid("missing `]`"))?;
                let index = inner[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                steps.push(Step::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(FieldPath {
            raw: trimmed.to_string(),
            steps,
        })
    }

    /// The value at this path, if every step resolves.
    pub fn find<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.steps.iter().try_fold(value, |current, step| match step {
            Step::Key(key) => current.as_object()?.get(key),
            Step::Index(index) => current.as_array()?.get(*index),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Raw lookups, `None` where the path has no (non-null) match.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseFields<'a> {
    pub result: Option<&'a Value>,
    pub input_tokens: Option<&'a Value>,
    pub output_tokens: Option<&'a Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub usage: TokenUsage,
}

/// Per-provider extractor with each path resolved to its override or default.
#[derive(Clone, Debug)]
pub struct ResponseExtractor {
    result: FieldPath,
    input_tokens: FieldPath,
    output_tokens: FieldPath,
}

impl ResponseExtractor {
    /// `None` for a path selects its default.
    pub fn new(
        result: Option<&str>,
        input_tokens: Option<&str>,
        output_tokens: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            result: resolve(result, DEFAULT_RESULT_PATH)?,
            input_tokens: resolve(input_tokens, DEFAULT_INPUT_TOKENS_PATH)?,
            output_tokens: resolve(output_tokens, DEFAULT_OUTPUT_TOKENS_PATH)?,
        })
    }

    pub fn lookup<'a>(&self, response: &'a Value) -> ResponseFields<'a> {
        let present = |path: &FieldPath| path.find(response).filter(|v| !v.is_null());
        ResponseFields {
            result: present(&self.result),
            input_tokens: present(&self.input_tokens),
            output_tokens: present(&self.output_tokens),
        }
    }

    /// Check the status, parse the body and pull out text and token counts.
    pub fn extract(&self, status: u16, body: &str) -> Result<Extraction> {
        if status != 200 {
            return Err(Error::Upstream {
                status,
                body: body.to_string(),
            });
        }
        let response: Value = serde_json::from_str(body)
            .map_err(|e| Error::malformed(format!("response body is not JSON: {}", e)))?;
        self.extract_value(&response)
    }

    pub fn extract_value(&self, response: &Value) -> Result<Extraction> {
        let fields = self.lookup(response);

        let text = match fields.result {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(Error::malformed(format!(
                    "no result text at `{}`",
                    self.result
                )));
            }
        };

        let usage = TokenUsage {
            input_tokens: token_count(fields.input_tokens, &self.input_tokens, "input")?,
            output_tokens: token_count(fields.output_tokens, &self.output_tokens, "output")?,
        };

        Ok(Extraction { text, usage })
    }
}

fn resolve(path: Option<&str>, default: &str) -> Result<FieldPath> {
    FieldPath::parse(path.unwrap_or(default))
}

fn token_count(value: Option<&Value>, path: &FieldPath, kind: &str) -> Result<u64> {
    let value =
        value.ok_or_else(|| Error::malformed(format!("no {} token count at `{}`", kind, path)))?;
    value.as_u64().ok_or_else(|| {
        Error::malformed(format!(
            "{} token count at `{}` is not a non-negative integer: {}",
            kind, path, value
        ))
    })
}

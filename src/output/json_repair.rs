//! Best-effort completion of truncated JSON.
//!
//! Streaming structured output arrives as a growing JSON prefix. [`fix_json`]
//! turns such a prefix into a parseable document by closing open strings,
//! completing literals and dropping dangling keys or separators, then
//! appending the missing closers.

use serde_json::Value;

/// Outcome of [`parse_partial_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum PartialJson {
    /// No input yet.
    Undefined,
    /// The input was already valid JSON.
    Successful(Value),
    /// The input parsed after repair.
    Repaired(Value),
    /// The input could not be parsed even after repair.
    Failed,
}

impl PartialJson {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Successful(value) | Self::Repaired(value) => Some(value),
            Self::Undefined | Self::Failed => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Successful(value) | Self::Repaired(value) => Some(value),
            Self::Undefined | Self::Failed => None,
        }
    }
}

/// Parse `text` as JSON, repairing a truncated prefix if needed.
pub fn parse_partial_json(text: Option<&str>) -> PartialJson {
    let Some(text) = text else {
        return PartialJson::Undefined;
    };
    if let Ok(value) = serde_json::from_str(text) {
        return PartialJson::Successful(value);
    }
    match serde_json::from_str(&fix_json(text)) {
        Ok(value) => PartialJson::Repaired(value),
        Err(_) => PartialJson::Failed,
    }
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Expect {
    KeyOrEnd,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug)]
struct Frame {
    closer: char,
    expect: Expect,
    /// Cut position discarding the member currently being written.
    resume: usize,
}

#[derive(Debug)]
enum Token {
    None,
    Str {
        key: bool,
        escape_at: Option<usize>,
        unicode_left: u8,
    },
    Number {
        start: usize,
    },
    Literal {
        start: usize,
    },
}

/// Complete a truncated JSON prefix. Valid JSON passes through unchanged.
pub fn fix_json(input: &str) -> String {
    let mut stack: Vec<Frame> = Vec::new();
    let mut token = Token::None;

    for (i, c) in input.char_indices() {
        match &mut token {
            Token::Str {
                key,
                escape_at,
                unicode_left,
            } => {
                if *unicode_left > 0 {
                    *unicode_left -= 1;
                    if *unicode_left == 0 {
                        *escape_at = None;
                    }
                } else if escape_at.is_some() {
                    if c == 'u' {
                        *unicode_left = 4;
                    } else {
                        *escape_at = None;
                    }
                } else if c == '\\' {
                    *escape_at = Some(i);
                } else if c == '"' {
                    let is_key = *key;
                    token = Token::None;
                    complete_value(&mut stack, is_key);
                }
                continue;
            }
            Token::Number { .. } => {
                if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                    continue;
                }
                token = Token::None;
                complete_value(&mut stack, false);
            }
            Token::Literal { .. } => {
                if c.is_ascii_alphabetic() {
                    continue;
                }
                token = Token::None;
                complete_value(&mut stack, false);
            }
            Token::None => {}
        }

        match c {
            '"' => {
                let key = stack
                    .last()
                    .is_some_and(|frame| frame.closer == '}' && frame.expect == Expect::KeyOrEnd);
                token = Token::Str {
                    key,
                    escape_at: None,
                    unicode_left: 0,
                };
            }
            '{' => stack.push(Frame {
                closer: '}',
                expect: Expect::KeyOrEnd,
                resume: i + 1,
            }),
            '[' => stack.push(Frame {
                closer: ']',
                expect: Expect::Value,
                resume: i + 1,
            }),
            '}' | ']' => {
                stack.pop();
                complete_value(&mut stack, false);
            }
            ':' => {
                if let Some(frame) = stack.last_mut() {
                    frame.expect = Expect::Value;
                }
            }
            ',' => {
                if let Some(frame) = stack.last_mut() {
                    frame.expect = if frame.closer == '}' {
                        Expect::KeyOrEnd
                    } else {
                        Expect::Value
                    };
                    frame.resume = i;
                }
            }
            '-' | '0'..='9' => token = Token::Number { start: i },
            't' | 'f' | 'n' => token = Token::Literal { start: i },
            _ => {}
        }
    }

    let mut out = match token {
        Token::Str { key: true, .. } => cut(input, &stack),
        Token::Str { escape_at, .. } => {
            let end = escape_at.unwrap_or(input.len());
            let mut out = input[..end].to_string();
            out.push('"');
            out
        }
        Token::Number { start } => {
            let digits = input[start..].trim_end_matches(|c: char| !c.is_ascii_digit());
            if digits.is_empty() {
                cut(input, &stack)
            } else {
                format!("{}{}", &input[..start], digits)
            }
        }
        Token::Literal { start } => {
            let partial = &input[start..];
            match ["true", "false", "null"]
                .into_iter()
                .find(|literal| literal.starts_with(partial))
            {
                Some(literal) => format!("{}{}", &input[..start], literal),
                None => cut(input, &stack),
            }
        }
        Token::None => match stack.last() {
            Some(frame) if frame.expect != Expect::CommaOrEnd => cut(input, &stack),
            _ => input.to_string(),
        },
    };

    for frame in stack.iter().rev() {
        out.push(frame.closer);
    }
    out
}

fn complete_value(stack: &mut [Frame], is_key: bool) {
    if let Some(frame) = stack.last_mut() {
        frame.expect = match frame.expect {
            Expect::KeyOrEnd if is_key => Expect::Colon,
            Expect::Value => Expect::CommaOrEnd,
            other => other,
        };
    }
}

/// Drop the incomplete member of the innermost container.
fn cut(input: &str, stack: &[Frame]) -> String {
    match stack.last() {
        Some(frame) => input[..frame.resume].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed(input: &str) -> Value {
        serde_json::from_str(&fix_json(input))
            .unwrap_or_else(|e| panic!("fix_json({input:?}) = {:?}: {e}", fix_json(input)))
    }

    #[test]
    fn valid_json_is_unchanged() {
        let text = r#"{"a": [1, 2, {"b": null}], "c": "x"}"#;
        assert_eq!(fix_json(text), text);
    }

    #[test]
    fn closes_open_containers_and_strings() {
        assert_eq!(fixed(r#"{"name": "Al"#), json!({"name": "Al"}));
        assert_eq!(fixed(r#"[1, 2"#), json!([1, 2]));
        assert_eq!(fixed(r#"{"a": {"b": [true"#), json!({"a": {"b": [true]}}));
    }

    #[test]
    fn drops_dangling_keys_and_commas() {
        assert_eq!(fixed(r#"{"a": 1, "#), json!({"a": 1}));
        assert_eq!(fixed(r#"{"a": 1, "b"#), json!({"a": 1}));
        assert_eq!(fixed(r#"{"a": 1, "b":"#), json!({"a": 1}));
        assert_eq!(fixed(r#"{"a"#), json!({}));
        assert_eq!(fixed(r#"[1,"#), json!([1]));
        assert_eq!(fixed(r#"{"a": {"#), json!({"a": {}}));
    }

    #[test]
    fn completes_partial_literals_and_numbers() {
        assert_eq!(fixed(r#"{"ok": tr"#), json!({"ok": true}));
        assert_eq!(fixed(r#"[nu"#), json!([null]));
        assert_eq!(fixed(r#"{"n": 12."#), json!({"n": 12}));
        assert_eq!(fixed(r#"[1, -"#), json!([1]));
    }

    #[test]
    fn handles_escapes_at_the_cut() {
        assert_eq!(fixed(r#"{"s": "a\"#), json!({"s": "a"}));
        assert_eq!(fixed(r#"{"s": "a\u00"#), json!({"s": "a"}));
        assert_eq!(fixed(r#"{"s": "a\"b"#), json!({"s": "a\"b"}));
    }

    #[test]
    fn parse_partial_reports_state() {
        assert_eq!(parse_partial_json(None), PartialJson::Undefined);
        assert_eq!(
            parse_partial_json(Some(r#"{"a":1}"#)),
            PartialJson::Successful(json!({"a": 1}))
        );
        assert_eq!(
            parse_partial_json(Some(r#"{"a":1"#)),
            PartialJson::Repaired(json!({"a": 1}))
        );
        assert_eq!(parse_partial_json(Some("}{")), PartialJson::Failed);
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_markdown_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}

//! Repair of JSON text returned by a language model.
//!
//! The repair is a fixed pipeline of heuristics, each targeting one defect
//! class commonly produced by models. Step order is part of the contract:
//! bare-key quoting looks for a trailing colon and must see the text before
//! quote normalization, and comma cleanup runs last because earlier steps can
//! leave new stray commas behind. The output is only a candidate document;
//! callers still parse it and treat a parse failure as a retry trigger.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PlanError;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("code fence pattern"));
static ESCAPED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\{\s*\\""#).expect("escaped object pattern"));
static BARE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$-]*)(\s*):").expect("bare key pattern")
});
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern"));
static COMMA_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*,)+").expect("comma run pattern"));
static LEADING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{\[])\s*,").expect("leading comma pattern"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

type Step = fn(&str) -> String;

// Runs after fence stripping and object extraction.
const REPAIR_STEPS: [Step; 6] = [
    unescape_embedded_json,
    quote_bare_keys,
    normalize_single_quotes,
    strip_trailing_commas,
    drop_stray_escapes,
    collapse_commas_and_whitespace,
];

pub fn sanitize(text: &str) -> Result<String, PlanError> {
    let unfenced = strip_code_fences(text);
    let mut candidate = extract_object(&unfenced)?.to_string();

    for step in REPAIR_STEPS {
        candidate = step(&candidate);
    }

    Ok(candidate)
}

fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

fn extract_object(text: &str) -> Result<&str, PlanError> {
    let start = text.find('{');
    let end = text.rfind('}');

    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        (None, _) | (_, None) => Err(PlanError::MalformedResponse(
            "no JSON object delimiters found".to_string(),
        )),
        _ => Err(PlanError::MalformedResponse(
            "closing brace precedes opening brace".to_string(),
        )),
    }
}

fn unescape_embedded_json(text: &str) -> String {
    if !ESCAPED_OBJECT.is_match(text) {
        return text.to_string();
    }
    text.replace("\\\"", "\"").replace("\\\\", "\\")
}

// Single-quoted values are still unconverted here, so they count as literals too.
fn quote_bare_keys(text: &str) -> String {
    segments_delimited_by(text, b"\"'")
        .into_iter()
        .map(|segment| match segment {
            Segment::Code(code) => BARE_KEY.replace_all(code, "${1}\"${2}\"${3}:").into_owned(),
            Segment::Literal(literal) => literal.to_string(),
        })
        .collect()
}

fn normalize_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                out.push(ch);
                copy_double_quoted(&mut chars, &mut out);
            }
            '\'' => {
                let mut body = String::new();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => body.push('\''),
                            Some(escaped) => {
                                body.push('\\');
                                body.push(escaped);
                            }
                            None => body.push('\\'),
                        },
                        '\'' => {
                            closed = true;
                            break;
                        }
                        '"' => body.push_str("\\\""),
                        other => body.push(other),
                    }
                }
                if closed {
                    out.push('"');
                    out.push_str(&body);
                    out.push('"');
                } else {
                    out.push('\'');
                    out.push_str(&body);
                }
            }
            other => out.push(other),
        }
    }

    out
}

fn copy_double_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    while let Some(inner) = chars.next() {
        out.push(inner);
        match inner {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => return,
            _ => {}
        }
    }
}

fn strip_trailing_commas(text: &str) -> String {
    map_outside_strings(text, |code| {
        TRAILING_COMMA.replace_all(code, "${1}").into_owned()
    })
}

fn drop_stray_escapes(text: &str) -> String {
    segments(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Code(code) => code.to_string(),
            Segment::Literal(literal) => drop_stray_escapes_in_literal(literal),
        })
        .collect()
}

fn drop_stray_escapes_in_literal(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some(next) if is_escape_target(next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            None => out.push('\\'),
            Some(_) => {}
        }
    }

    out
}

fn is_escape_target(ch: char) -> bool {
    matches!(ch, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')
}

fn collapse_commas_and_whitespace(text: &str) -> String {
    map_outside_strings(text, |code| {
        let code = WHITESPACE_RUN.replace_all(code, " ");
        let code = COMMA_RUN.replace_all(&code, ",");
        let code = LEADING_COMMA.replace_all(&code, "${1}");
        TRAILING_COMMA.replace_all(&code, "${1}").into_owned()
    })
    .trim()
    .to_string()
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Code(&'a str),
    /// A quoted literal including its quotes.
    Literal(&'a str),
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    segments_delimited_by(text, b"\"")
}

/// Splits `text` into code and literals opened by any byte in `quotes`.
/// A literal closes on the same quote byte that opened it.
fn segments_delimited_by<'a>(text: &'a str, quotes: &[u8]) -> Vec<Segment<'a>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut index = 0;

    while index < bytes.len() {
        if !quotes.contains(&bytes[index]) {
            index += 1;
            continue;
        }
        if code_start < index {
            out.push(Segment::Code(&text[code_start..index]));
        }
        let quote = bytes[index];
        let literal_start = index;
        index += 1;
        while index < bytes.len() {
            match bytes[index] {
                b'\\' => index += 2,
                byte if byte == quote => {
                    index += 1;
                    break;
                }
                _ => index += 1,
            }
        }
        let literal_end = index.min(bytes.len());
        out.push(Segment::Literal(&text[literal_start..literal_end]));
        code_start = literal_end;
        index = literal_end;
    }

    if code_start < bytes.len() {
        out.push(Segment::Code(&text[code_start..]));
    }
    out
}

fn map_outside_strings(text: &str, transform: impl Fn(&str) -> String) -> String {
    segments(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Code(code) => transform(code),
            Segment::Literal(literal) => literal.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(text: &str) -> Value {
        let cleaned = sanitize(text).expect("sanitize should find an object");
        serde_json::from_str(&cleaned)
            .unwrap_or_else(|err| panic!("sanitized text should parse: {err}\n{cleaned}"))
    }

    #[test]
    fn repairs_typical_model_output() {
        let raw = r#"Here is your plan:
```json
{
  events: [
    {'type': 'activity', name: 'British Museum', startTime: '10:00', endTime: '12:00', cost: 0,},
    {type: "activity", "name": "Dishoom", startTime: "12:30", endTime: "13:30", cost: 25,},
  ],
}
```
Enjoy your day!"#;

        let value = parse(raw);
        let events = value["events"].as_array().expect("events array");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "British Museum");
        assert_eq!(events[0]["startTime"], "10:00");
        assert_eq!(events[1]["cost"], 25);
    }

    #[test]
    fn leaves_string_contents_alone() {
        let raw = r#"{"events": [{"name": "Joe's Cafe", "note": "open late, bring cash: yes"}]}"#;
        let value = parse(raw);
        assert_eq!(value["events"][0]["name"], "Joe's Cafe");
        assert_eq!(value["events"][0]["note"], "open late, bring cash: yes");
    }

    #[test]
    fn leaves_single_quoted_values_alone() {
        let value = parse("{events: [{name: 'Market', description: 'Open daily, hours: 9-5'}]}");
        assert_eq!(value["events"][0]["name"], "Market");
        assert_eq!(value["events"][0]["description"], "Open daily, hours: 9-5");

        let value = parse(
            r#"{events: [], "note": "it's fine, really: yes", tip: 'go early, stay: late'}"#,
        );
        assert_eq!(value["note"], "it's fine, really: yes");
        assert_eq!(value["tip"], "go early, stay: late");
    }

    #[test]
    fn unescapes_an_escaped_object() {
        let value = parse(r#"{\"events\": [{\"name\": \"Tate\"}]}"#);
        assert_eq!(value["events"][0]["name"], "Tate");
    }

    #[test]
    fn drops_invalid_escapes_but_keeps_valid_ones() {
        let value = parse(r#"{"events": [], "a": "Caf\é", "b": "C:\\temp", "c": "line\nbreak"}"#);
        assert_eq!(value["a"], "Café");
        assert_eq!(value["b"], "C:\\temp");
        assert_eq!(value["c"], "line\nbreak");
    }

    #[test]
    fn collapses_comma_runs() {
        let value = parse(r#"{"events": [1,, 2,,], , "x": 1}"#);
        assert_eq!(value["events"], serde_json::json!([1, 2]));
        assert_eq!(value["x"], 1);
    }

    #[test]
    fn single_quoted_values_with_double_quotes_inside() {
        let value = parse(r#"{events: [], quote: 'she said "hi"'}"#);
        assert_eq!(value["quote"], "she said \"hi\"");
    }

    #[test]
    fn rejects_text_without_an_object() {
        assert!(matches!(
            sanitize("sorry, I cannot help with that"),
            Err(PlanError::MalformedResponse(_))
        ));
        assert!(matches!(
            sanitize("} nothing here {"),
            Err(PlanError::MalformedResponse(_))
        ));
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            r#"{"events": [{"name": "Kew Gardens", "cost": 22.5}]}"#,
            "```json\n{ events: [ {name: 'A'}, ], }\n```",
            r#"{"events": [], "note": "a, b: c"}"#,
        ];
        for input in inputs {
            let once = sanitize(input).unwrap();
            let twice = sanitize(&once).unwrap();
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn segments_split_on_literals() {
        assert_eq!(
            segments(r#"{"a": "b\"c"}"#),
            vec![
                Segment::Code("{"),
                Segment::Literal(r#""a""#),
                Segment::Code(": "),
                Segment::Literal(r#""b\"c""#),
                Segment::Code("}"),
            ]
        );
    }
}

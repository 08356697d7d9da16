//! Expression layer scanner (spec §4.4(a)): finds `@param`/`@config`/
//! `@tool`/`@resource`/`@prompt` forms in a string and parses each into an
//! [`Expr`], leaving everything else as literal text.

use serde_json::Value;
use vmcp_core::VmcpError;

/// Where an `@resource` expression points.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceTarget {
    Uri(String),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(String),
    Config(String),
    Tool { name: String, args: Value },
    Resource(ResourceTarget),
    Prompt { name: String, args: Value },
}

/// One piece of a scanned string: either passed through unchanged or an
/// expression to resolve and substitute.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr { offset: usize, expr: Expr },
}

/// Scans `text` into alternating literal/expression segments.
pub fn scan(text: &str) -> Result<Vec<Segment>, VmcpError> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'@' {
            i += 1;
            continue;
        }

        let keyword_start = i + 1;
        let keyword = match_keyword(&text[keyword_start..]);
        let Some((keyword, keyword_len)) = keyword else {
            i += 1;
            continue;
        };

        if literal_start < i {
            segments.push(Segment::Literal(text[literal_start..i].to_string()));
        }

        let form_start = i;
        let mut cursor = keyword_start + keyword_len;
        let expr = parse_form(text, keyword, &mut cursor, form_start)?;
        segments.push(Segment::Expr { offset: form_start, expr });

        i = cursor;
        literal_start = i;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(text[literal_start..].to_string()));
    }

    Ok(segments)
}

fn match_keyword(rest: &str) -> Option<(&'static str, usize)> {
    const KEYWORDS: [&str; 5] = ["param", "config", "tool", "resource", "prompt"];
    for kw in KEYWORDS {
        if !rest.starts_with(kw) {
            continue;
        }
        // Require a word boundary after the keyword so `@configuration`
        // doesn't get mistaken for `@config` followed by garbage.
        let boundary_ok = rest[kw.len()..]
            .chars()
            .next()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        if boundary_ok {
            return Some((kw, kw.len()));
        }
    }
    None
}

fn syntax_err(offset: usize, detail: impl Into<String>) -> VmcpError {
    VmcpError::TemplateSyntax { offset, detail: detail.into() }
}

fn parse_form(text: &str, keyword: &str, cursor: &mut usize, form_start: usize) -> Result<Expr, VmcpError> {
    match keyword {
        "param" => parse_param(text, cursor, form_start),
        "config" => parse_dotted_name(text, cursor, form_start).map(Expr::Config),
        "tool" => {
            let (name, args) = parse_call(text, cursor, form_start)?;
            Ok(Expr::Tool { name, args })
        }
        "prompt" => {
            let (name, args) = parse_call(text, cursor, form_start)?;
            Ok(Expr::Prompt { name, args })
        }
        "resource" => parse_resource(text, cursor, form_start),
        _ => unreachable!(),
    }
}

fn peek(text: &str, pos: usize) -> Option<u8> {
    text.as_bytes().get(pos).copied()
}

fn skip_ws(text: &str, pos: &mut usize) {
    while let Some(b) = peek(text, *pos) {
        if b == b' ' || b == b'\t' || b == b'\n' || b == b'\r' {
            *pos += 1;
        } else {
            break;
        }
    }
}

fn parse_param(text: &str, cursor: &mut usize, form_start: usize) -> Result<Expr, VmcpError> {
    match peek(text, *cursor) {
        Some(b'.') => {
            *cursor += 1;
            parse_identifier(text, cursor, form_start).map(Expr::Param)
        }
        Some(b'[') => {
            *cursor += 1;
            skip_ws(text, cursor);
            if peek(text, *cursor) != Some(b'"') {
                return Err(syntax_err(form_start, "expected '\"' after '@param['"));
            }
            let name = parse_quoted_string(text, cursor, form_start)?;
            skip_ws(text, cursor);
            if peek(text, *cursor) != Some(b']') {
                return Err(syntax_err(form_start, "expected ']' closing '@param['"));
            }
            *cursor += 1;
            Ok(Expr::Param(name))
        }
        _ => Err(syntax_err(form_start, "expected '.' or '[' after '@param'")),
    }
}

fn parse_resource(text: &str, cursor: &mut usize, form_start: usize) -> Result<Expr, VmcpError> {
    match peek(text, *cursor) {
        Some(b'(') => {
            *cursor += 1;
            skip_ws(text, cursor);
            if peek(text, *cursor) != Some(b'"') {
                return Err(syntax_err(form_start, "expected '\"' after '@resource('"));
            }
            let uri = parse_quoted_string(text, cursor, form_start)?;
            skip_ws(text, cursor);
            if peek(text, *cursor) != Some(b')') {
                return Err(syntax_err(form_start, "expected ')' closing '@resource('"));
            }
            *cursor += 1;
            Ok(Expr::Resource(ResourceTarget::Uri(uri)))
        }
        Some(b'.') => {
            *cursor += 1;
            parse_identifier(text, cursor, form_start).map(|alias| Expr::Resource(ResourceTarget::Alias(alias)))
        }
        _ => Err(syntax_err(form_start, "expected '(' or '.' after '@resource'")),
    }
}

fn parse_identifier(text: &str, cursor: &mut usize, form_start: usize) -> Result<String, VmcpError> {
    let start = *cursor;
    while let Some(b) = peek(text, *cursor) {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            *cursor += 1;
        } else {
            break;
        }
    }
    if *cursor == start {
        return Err(syntax_err(form_start, "expected an identifier"));
    }
    Ok(text[start..*cursor].to_string())
}

fn parse_dotted_name(text: &str, cursor: &mut usize, form_start: usize) -> Result<String, VmcpError> {
    if peek(text, *cursor) != Some(b'.') {
        return Err(syntax_err(form_start, "expected '.' after '@config'"));
    }
    *cursor += 1;
    parse_identifier(text, cursor, form_start)
}

/// Parses a double-quoted string with `\"` and `\\` escapes, leaving
/// `cursor` just past the closing quote.
fn parse_quoted_string(text: &str, cursor: &mut usize, form_start: usize) -> Result<String, VmcpError> {
    debug_assert_eq!(peek(text, *cursor), Some(b'"'));
    *cursor += 1;
    let mut out = String::new();
    loop {
        match peek(text, *cursor) {
            None => return Err(syntax_err(form_start, "unterminated string literal")),
            Some(b'"') => {
                *cursor += 1;
                return Ok(out);
            }
            Some(b'\\') => {
                *cursor += 1;
                match peek(text, *cursor) {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(other) => out.push(other as char),
                    None => return Err(syntax_err(form_start, "unterminated escape sequence")),
                }
                *cursor += 1;
            }
            Some(_) => {
                let ch_start = *cursor;
                let ch = text[ch_start..].chars().next().unwrap();
                *cursor += ch.len_utf8();
                out.push(ch);
            }
        }
    }
}

/// Parses `("NAME"[, {json}])`, returning the name and args (defaulting to
/// an empty object when no json argument is given).
fn parse_call(text: &str, cursor: &mut usize, form_start: usize) -> Result<(String, Value), VmcpError> {
    if peek(text, *cursor) != Some(b'(') {
        return Err(syntax_err(form_start, "expected '(' after call form"));
    }
    *cursor += 1;
    skip_ws(text, cursor);
    if peek(text, *cursor) != Some(b'"') {
        return Err(syntax_err(form_start, "expected a quoted name"));
    }
    let name = parse_quoted_string(text, cursor, form_start)?;
    skip_ws(text, cursor);

    let args = match peek(text, *cursor) {
        Some(b',') => {
            *cursor += 1;
            skip_ws(text, cursor);
            let json_start = *cursor;
            let json_end = find_matching_paren(text, *cursor, form_start)?;
            let raw = text[json_start..json_end].trim();
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| syntax_err(form_start, format!("invalid json argument: {e}")))?;
            *cursor = json_end;
            value
        }
        Some(b')') => Value::Object(Default::default()),
        _ => return Err(syntax_err(form_start, "expected ',' or ')' after name")),
    };

    skip_ws(text, cursor);
    if peek(text, *cursor) != Some(b')') {
        return Err(syntax_err(form_start, "expected ')' closing call"));
    }
    *cursor += 1;
    Ok((name, args))
}

/// Finds the byte offset of the `)` that closes the call started at
/// `form_start`, treating `{`/`[`/string literals as nested JSON, not as
/// part of the outer call syntax.
fn find_matching_paren(text: &str, mut pos: usize, form_start: usize) -> Result<usize, VmcpError> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    while pos < bytes.len() {
        let b = bytes[pos];
        if in_string {
            match b {
                b'\\' => pos += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth -= 1,
                b')' if depth == 0 => return Ok(pos),
                _ => {}
            }
        }
        pos += 1;
    }
    Err(syntax_err(form_start, "unterminated call argument"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scans_literal_text_unchanged() {
        let segments = scan("hello world").unwrap();
        assert_eq!(segments, vec![Segment::Literal("hello world".to_string())]);
    }

    #[test]
    fn scans_param_dot_form() {
        let segments = scan("hi @param.name!").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("hi ".to_string()),
                Segment::Expr { offset: 3, expr: Expr::Param("name".to_string()) },
                Segment::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn scans_param_bracket_form() {
        let segments = scan(r#"@param["full name"]"#).unwrap();
        assert_eq!(
            segments,
            vec![Segment::Expr { offset: 0, expr: Expr::Param("full name".to_string()) }]
        );
    }

    #[test]
    fn scans_config_form() {
        let segments = scan("@config.API_BASE").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Expr { offset: 0, expr: Expr::Config("API_BASE".to_string()) }]
        );
    }

    #[test]
    fn scans_tool_call_with_json_args() {
        let segments = scan(r#"@tool("search", {"q": "rust", "limit": 3})"#).unwrap();
        assert_eq!(
            segments,
            vec![Segment::Expr {
                offset: 0,
                expr: Expr::Tool {
                    name: "search".to_string(),
                    args: json!({"q": "rust", "limit": 3}),
                },
            }]
        );
    }

    #[test]
    fn scans_tool_call_without_args() {
        let segments = scan(r#"@tool("ping")"#).unwrap();
        assert_eq!(
            segments,
            vec![Segment::Expr {
                offset: 0,
                expr: Expr::Tool { name: "ping".to_string(), args: json!({}) },
            }]
        );
    }

    #[test]
    fn scans_resource_uri_and_alias_forms() {
        let text = r#"@resource("file:///a.txt") and @resource.docs"#;
        let second_offset = text.rfind("@resource.docs").unwrap();
        let segments = scan(text).unwrap();
        assert_eq!(
            segments[0],
            Segment::Expr { offset: 0, expr: Expr::Resource(ResourceTarget::Uri("file:///a.txt".to_string())) }
        );
        assert_eq!(
            segments[2],
            Segment::Expr {
                offset: second_offset,
                expr: Expr::Resource(ResourceTarget::Alias("docs".to_string())),
            }
        );
    }

    #[test]
    fn unterminated_call_is_a_syntax_error_with_offset() {
        let err = scan(r#"@tool("search""#).unwrap_err();
        match err {
            VmcpError::TemplateSyntax { offset, .. } => assert_eq!(offset, 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn keyword_prefix_followed_by_more_identifier_chars_is_not_a_match() {
        let segments = scan("@configuration_flag").unwrap();
        assert_eq!(segments, vec![Segment::Literal("@configuration_flag".to_string())]);
    }

    #[test]
    fn plain_at_sign_without_a_keyword_is_left_literal() {
        let segments = scan("user@example.com").unwrap();
        assert_eq!(segments, vec![Segment::Literal("user@example.com".to_string())]);
    }
}

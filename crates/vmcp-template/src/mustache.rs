//! Text-template layer (spec §4.4(b)): a small mustache subset —
//! `{{var}}`, `{{#if cond}}...{{/if}}`, `{{#each items}}...{{/each}}` —
//! run over the parameter namespace after expression substitution. Unknown
//! variables render as empty; malformed tags never raise (spec: "do not
//! raise"), they're simply left as literal text.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(Vec<String>),
    If { path: Vec<String>, body: Vec<Node> },
    Each { path: Vec<String>, body: Vec<Node> },
}

pub fn render(text: &str, params: &Value) -> String {
    let tokens = tokenize(text);
    let (nodes, _) = parse_nodes(&tokens, 0, None);
    let mut out = String::new();
    render_nodes(&nodes, &[params], &mut out);
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Tag(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = text;
    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    tokens.push(Token::Text(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    tokens.push(Token::Text(rest[..start].to_string()));
                }
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        // No closing `}}`: treat the rest as literal text
                        // rather than raising (spec: malformed tags don't
                        // raise in this layer).
                        tokens.push(Token::Text(rest[start..].to_string()));
                        break;
                    }
                    Some(end) => {
                        tokens.push(Token::Tag(after_open[..end].trim().to_string()));
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }
    tokens
}

/// Parses tokens into a node tree starting at `pos`, stopping at a
/// matching `closing` tag (`/if` or `/each`) if one is given. Returns the
/// nodes and the index just past the consumed closing tag (or the end of
/// input if `closing` is `None` or never found).
fn parse_nodes(tokens: &[Token], mut pos: usize, closing: Option<&str>) -> (Vec<Node>, usize) {
    let mut nodes = Vec::new();
    while pos < tokens.len() {
        match &tokens[pos] {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                pos += 1;
            }
            Token::Tag(tag) => {
                if let Some(close) = closing {
                    if tag == close {
                        return (nodes, pos + 1);
                    }
                }
                if let Some(cond) = tag.strip_prefix("#if ") {
                    let (body, next) = parse_nodes(tokens, pos + 1, Some("/if"));
                    nodes.push(Node::If { path: split_path(cond.trim()), body });
                    pos = next;
                } else if let Some(items) = tag.strip_prefix("#each ") {
                    let (body, next) = parse_nodes(tokens, pos + 1, Some("/each"));
                    nodes.push(Node::Each { path: split_path(items.trim()), body });
                    pos = next;
                } else if tag == "/if" || tag == "/each" {
                    // Stray closing tag with no matching opener: render it
                    // back out as literal text rather than raising.
                    nodes.push(Node::Text(format!("{{{{{tag}}}}}")));
                    pos += 1;
                } else {
                    nodes.push(Node::Var(split_path(tag)));
                    pos += 1;
                }
            }
        }
    }
    (nodes, pos)
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(|s| s.to_string()).collect()
}

fn lookup<'a>(stack: &[&'a Value], path: &[String]) -> Option<&'a Value> {
    if path.is_empty() || (path.len() == 1 && path[0] == ".") {
        return stack.last().copied();
    }
    for scope in stack.iter().rev() {
        let mut current = *scope;
        let mut found = true;
        for segment in path {
            match current.get(segment) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return Some(current);
        }
    }
    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_nodes(nodes: &[Node], stack: &[&Value], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(path) => {
                if let Some(value) = lookup(stack, path) {
                    out.push_str(&value_to_text(value));
                }
                // unknown variable: render empty, per spec.
            }
            Node::If { path, body } => {
                if lookup(stack, path).map(is_truthy).unwrap_or(false) {
                    render_nodes(body, stack, out);
                }
            }
            Node::Each { path, body } => {
                if let Some(Value::Array(items)) = lookup(stack, path) {
                    for item in items {
                        let mut child_stack = stack.to_vec();
                        child_stack.push(item);
                        render_nodes(body, &child_stack, out);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_plain_variable() {
        let params = json!({"name": "Ada"});
        assert_eq!(render("hello {{name}}", &params), "hello Ada");
    }

    #[test]
    fn unknown_variable_renders_empty() {
        let params = json!({});
        assert_eq!(render("hello {{missing}}", &params), "hello ");
    }

    #[test]
    fn if_block_renders_only_when_truthy() {
        let shown = json!({"flag": true});
        let hidden = json!({"flag": false});
        assert_eq!(render("{{#if flag}}yes{{/if}}", &shown), "yes");
        assert_eq!(render("{{#if flag}}yes{{/if}}", &hidden), "");
    }

    #[test]
    fn each_block_iterates_items_with_inner_scope() {
        let params = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(
            render("{{#each items}}[{{name}}]{{/each}}", &params),
            "[a][b]"
        );
    }

    #[test]
    fn each_over_empty_array_renders_nothing() {
        let params = json!({"items": []});
        assert_eq!(render("{{#each items}}[{{name}}]{{/each}}", &params), "");
    }

    #[test]
    fn unterminated_tag_is_left_as_literal_text() {
        assert_eq!(render("a {{oops", &json!({})), "a {{oops");
    }

    #[test]
    fn dotted_path_resolves_nested_objects() {
        let params = json!({"user": {"name": "Grace"}});
        assert_eq!(render("{{user.name}}", &params), "Grace");
    }
}

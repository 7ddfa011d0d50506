//! Variable substitution (`{{ path.to.value }}`) and guard-condition
//! evaluation shared by node `input`/`when` fields and edge `when` guards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Resolve a dotted path (`a.b.c`) against a JSON value. Array indices are
/// supported as numeric segments (`items.0.name`).
pub fn resolve_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Replace every `{{ path }}` occurrence in `template` with the string
/// form of the resolved value. A missing path substitutes the empty
/// string; callers should emit a `binding:missing` warning signal when
/// `had_missing` comes back true.
pub fn substitute(template: &str, ctx: &Value) -> (String, bool) {
    let mut out = String::with_capacity(template.len());
    let mut had_missing = false;
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                match resolve_path(ctx, path) {
                    Some(value) => out.push_str(&value_to_string(value)),
                    None => had_missing = true,
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, had_missing)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Recursively substitute every string leaf of a JSON value, returning
/// whether any path was missing along the way.
pub fn substitute_value(input: &Value, ctx: &Value) -> (Value, bool) {
    match input {
        Value::String(s) => {
            let (resolved, missing) = substitute(s, ctx);
            (Value::String(resolved), missing)
        }
        Value::Array(items) => {
            let mut missing_any = false;
            let out = items
                .iter()
                .map(|v| {
                    let (r, m) = substitute_value(v, ctx);
                    missing_any |= m;
                    r
                })
                .collect();
            (Value::Array(out), missing_any)
        }
        Value::Object(map) => {
            let mut missing_any = false;
            let out = map
                .iter()
                .map(|(k, v)| {
                    let (r, m) = substitute_value(v, ctx);
                    missing_any |= m;
                    (k.clone(), r)
                })
                .collect();
            (Value::Object(out), missing_any)
        }
        other => (other.clone(), false),
    }
}

/// Structured condition AST — the alternative to the string-expression
/// form for `when`/`gate` fields, with identical truth semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Equals { var: String, value: Value },
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Exists(String),
}

impl Condition {
    pub fn eval(&self, ctx: &Value) -> bool {
        match self {
            Condition::Equals { var, value } => resolve_path(ctx, var) == Some(value),
            Condition::Not(inner) => !inner.eval(ctx),
            Condition::And(items) => items.iter().all(|c| c.eval(ctx)),
            Condition::Or(items) => items.iter().any(|c| c.eval(ctx)),
            Condition::Exists(var) => resolve_path(ctx, var).is_some(),
        }
    }
}

/// Parse and evaluate the string-expression form of a guard:
/// `path op literal-or-path`, combined with `and`/`or`, negated with `not`,
/// or `$exists(path)`.
pub fn eval_expr(expr: &str, ctx: &Value) -> Result<bool> {
    let expr = expr.trim();
    if let Some(inner) = expr.strip_prefix("not ") {
        return Ok(!eval_expr(inner, ctx)?);
    }
    if let Some(rest) = split_top_level(expr, " and ") {
        return Ok(eval_expr(rest.0, ctx)? && eval_expr(rest.1, ctx)?);
    }
    if let Some(rest) = split_top_level(expr, " or ") {
        return Ok(eval_expr(rest.0, ctx)? || eval_expr(rest.1, ctx)?);
    }
    if let Some(inner) = expr.strip_prefix("$exists(").and_then(|s| s.strip_suffix(')')) {
        return Ok(resolve_path(ctx, inner.trim()).is_some());
    }
    for op in ["!=", ">=", "<=", "=", ">", "<"] {
        if let Some((lhs, rhs)) = split_op(expr, op) {
            let left = resolve_path(ctx, lhs.trim());
            let right = literal_or_path(rhs.trim(), ctx);
            return Ok(compare(op, left, right.as_ref()));
        }
    }
    Err(CoreError::binding(format!("unparseable expression: {expr}")))
}

fn split_top_level<'a>(expr: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    expr.find(sep).map(|idx| (&expr[..idx], &expr[idx + sep.len()..]))
}

fn split_op<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    // Avoid matching `=` inside `!=`/`>=`/`<=` by scanning left to right
    // and preferring the first, longest operator found.
    let idx = expr.find(op)?;
    if op == "=" {
        if idx > 0 && matches!(expr.as_bytes()[idx - 1], b'!' | b'>' | b'<' | b'=') {
            return None;
        }
    }
    Some((&expr[..idx], &expr[idx + op.len()..]))
}

fn literal_or_path(token: &str, ctx: &Value) -> Option<Value> {
    if let Ok(n) = token.parse::<f64>() {
        return Some(serde_json::json!(n));
    }
    if token == "true" || token == "false" {
        return Some(serde_json::json!(token == "true"));
    }
    if (token.starts_with('"') && token.ends_with('"'))
        || (token.starts_with('\'') && token.ends_with('\''))
    {
        return Some(Value::String(token[1..token.len() - 1].to_string()));
    }
    resolve_path(ctx, token).cloned()
}

fn compare(op: &str, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        "=" => left == right,
        "!=" => left != right,
        _ => {
            let (Some(l), Some(r)) = (left.and_then(Value::as_f64), right.and_then(Value::as_f64))
            else {
                return false;
            };
            match op {
                ">" => l > r,
                "<" => l < r,
                ">=" => l >= r,
                "<=" => l <= r,
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitute_replaces_known_paths() {
        let ctx = json!({"flow": {"input": {"name": "ada"}}});
        let (out, missing) = substitute("hello {{ flow.input.name }}!", &ctx);
        assert_eq!(out, "hello ada!");
        assert!(!missing);
    }

    #[test]
    fn substitute_flags_missing_paths() {
        let ctx = json!({});
        let (out, missing) = substitute("{{ nope }}", &ctx);
        assert_eq!(out, "");
        assert!(missing);
    }

    #[test]
    fn structured_condition_equals() {
        let ctx = json!({"state": {"count": 3}});
        let cond = Condition::Equals {
            var: "state.count".into(),
            value: json!(3),
        };
        assert!(cond.eval(&ctx));
    }

    #[test]
    fn expr_numeric_comparison() {
        let ctx = json!({"state": {"count": 5}});
        assert!(eval_expr("state.count > 3", &ctx).unwrap());
        assert!(!eval_expr("state.count < 3", &ctx).unwrap());
    }

    #[test]
    fn expr_and_or_not() {
        let ctx = json!({"a": true, "b": false});
        assert!(eval_expr("$exists(a) and not $exists(missing)", &ctx).unwrap());
        assert!(eval_expr("$exists(missing) or $exists(a)", &ctx).unwrap());
    }
}

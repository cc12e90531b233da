//! Inline expressions: `ds_${0..1}.t_order_${0..3}` style templates.
//!
//! A template is literal text with `${...}` (or `$->{...}`) placeholders.
//! A placeholder is either an integer range `a..b` or a CEL expression.
//! Top-level commas separate independent templates.

use serde_json::Value as JsonValue;

use crate::cel::CelEvaluator;
use crate::{ShardlineError, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Expands every template into the cartesian product of its placeholder
/// values, preserving declaration order.
pub fn expand_inline_expression(expression: &str) -> Result<Vec<String>, ShardlineError> {
    let evaluator = CelEvaluator::new();
    let mut expanded = Vec::new();
    for template in split_top_level(expression)? {
        let mut partial = vec![String::new()];
        for segment in parse_segments(&template)? {
            let choices = match segment {
                Segment::Literal(text) => vec![text],
                Segment::Placeholder(body) => placeholder_values(&body, &evaluator)?,
            };
            let mut next = Vec::with_capacity(partial.len() * choices.len());
            for prefix in &partial {
                for choice in &choices {
                    next.push(format!("{prefix}{choice}"));
                }
            }
            partial = next;
        }
        expanded.extend(partial);
    }
    Ok(expanded)
}

/// Renders a single-valued template with `variables` bound, e.g.
/// `t_order_${user_id % 4}`.
pub(crate) fn render_inline_template(
    template: &str,
    variables: &[(&str, &Value)],
    evaluator: &CelEvaluator,
) -> Result<String, ShardlineError> {
    let mut rendered = String::new();
    for segment in parse_segments(template)? {
        match segment {
            Segment::Literal(text) => rendered.push_str(&text),
            Segment::Placeholder(body) => {
                let value = evaluator.evaluate(body.trim(), variables)?;
                rendered.push_str(&scalar_text(&value).ok_or_else(|| {
                    ShardlineError::configuration(format!(
                        "inline expression '{body}' must produce a scalar, got {value}"
                    ))
                })?);
            }
        }
    }
    Ok(rendered)
}

/// Placeholder bodies of a template, for validation.
pub(crate) fn template_placeholders(template: &str) -> Result<Vec<String>, ShardlineError> {
    Ok(parse_segments(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(body) => Some(body),
            Segment::Literal(_) => None,
        })
        .collect())
}

fn split_top_level(expression: &str) -> Result<Vec<String>, ShardlineError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in expression.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| unbalanced(expression))?;
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if depth != 0 {
        return Err(unbalanced(expression));
    }
    parts.push(current.trim().to_string());
    Ok(parts.into_iter().filter(|part| !part.is_empty()).collect())
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, ShardlineError> {
    let mut segments = Vec::new();
    let mut rest = template;
    loop {
        let Some(position) = rest.find('$') else {
            if !rest.is_empty() {
                segments.push(Segment::Literal(rest.to_string()));
            }
            return Ok(segments);
        };
        let after = &rest[position + 1..];
        let body_start = if after.starts_with("->{") {
            3
        } else if after.starts_with('{') {
            1
        } else {
            segments.push(Segment::Literal(rest[..=position].to_string()));
            rest = after;
            continue;
        };
        if position > 0 {
            segments.push(Segment::Literal(rest[..position].to_string()));
        }
        let body = &after[body_start..];
        let mut depth = 1usize;
        let mut end = None;
        for (index, ch) in body.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(index);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| unbalanced(template))?;
        segments.push(Segment::Placeholder(body[..end].to_string()));
        rest = &body[end + 1..];
    }
}

fn placeholder_values(body: &str, evaluator: &CelEvaluator) -> Result<Vec<String>, ShardlineError> {
    if let Some((start, end)) = body.split_once("..") {
        if let (Ok(start), Ok(end)) = (start.trim().parse::<i64>(), end.trim().parse::<i64>()) {
            if end < start {
                return Err(ShardlineError::configuration(format!(
                    "inline range '{body}' is descending"
                )));
            }
            return Ok((start..=end).map(|value| value.to_string()).collect());
        }
    }
    let value = evaluator.evaluate(body.trim(), &[])?;
    match value {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                scalar_text(item).ok_or_else(|| {
                    ShardlineError::configuration(format!(
                        "inline expression '{body}' contains a non-scalar item {item}"
                    ))
                })
            })
            .collect(),
        other => scalar_text(&other).map(|text| vec![text]).ok_or_else(|| {
            ShardlineError::configuration(format!(
                "inline expression '{body}' must produce a scalar or a list"
            ))
        }),
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        JsonValue::Number(number) => number.as_i64().map(|whole| whole.to_string()).or_else(|| {
            number.as_f64().map(|real| {
                if real.fract() == 0.0 {
                    (real as i64).to_string()
                } else {
                    real.to_string()
                }
            })
        }),
        _ => None,
    }
}

fn unbalanced(expression: &str) -> ShardlineError {
    ShardlineError::configuration(format!("unbalanced braces in inline expression '{expression}'"))
}

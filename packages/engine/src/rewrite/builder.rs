use crate::route::RouteUnit;
use crate::ShardlineError;

use super::SqlToken;

/// Renders `sql` for one unit: text before the first token, each rendered
/// token, the literal text between tokens and the trailing text. Without
/// tokens the original SQL comes back unchanged.
pub fn build_sql(sql: &str, tokens: &[SqlToken], unit: &RouteUnit) -> Result<String, ShardlineError> {
    if tokens.is_empty() {
        return Ok(sql.to_string());
    }
    let mut ordered = tokens
        .iter()
        .map(|token| {
            let start = token.start().min(sql.len());
            let stop = token.stop().clamp(start, sql.len());
            (start, stop, token)
        })
        .collect::<Vec<_>>();
    ordered.sort_by_key(|(start, stop, _)| (*start, *stop));

    let mut rendered = String::with_capacity(sql.len() + 32);
    let mut cursor = 0usize;
    for (start, stop, token) in ordered {
        if start < cursor {
            return Err(ShardlineError::RewriteInvariantViolation(format!(
                "token [{}, {}) overlaps text already rewritten up to {cursor}",
                token.start(),
                token.stop()
            )));
        }
        let (Some(before), true) = (sql.get(cursor..start), sql.is_char_boundary(stop)) else {
            return Err(ShardlineError::RewriteInvariantViolation(format!(
                "token [{start}, {stop}) splits a character"
            )));
        };
        rendered.push_str(before);
        rendered.push_str(&token.content().render(unit));
        cursor = stop;
    }
    rendered.push_str(&sql[cursor..]);
    Ok(rendered)
}

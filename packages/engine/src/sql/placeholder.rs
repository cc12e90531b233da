use crate::ShardlineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlaceholderState {
    next_ordinal: usize,
}

impl PlaceholderState {
    pub(crate) fn new() -> Self {
        Self { next_ordinal: 0 }
    }
}

/// Maps a marker token (`?`, `?N`, `$N`) to a zero-based parameter index.
/// Bare `?` markers take the next ordinal after the highest one seen so far.
pub(crate) fn resolve_placeholder_index(
    token: &str,
    params_len: usize,
    state: &mut PlaceholderState,
) -> Result<usize, ShardlineError> {
    let trimmed = token.trim();

    let source_index = if trimmed.is_empty() || trimmed == "?" {
        let source_index = state.next_ordinal;
        state.next_ordinal += 1;
        source_index
    } else if let Some(numeric) = trimmed.strip_prefix('?') {
        let parsed = parse_1_based_index(trimmed, numeric)?;
        state.next_ordinal = state.next_ordinal.max(parsed);
        parsed - 1
    } else if let Some(numeric) = trimmed.strip_prefix('$') {
        let parsed = parse_1_based_index(trimmed, numeric)?;
        state.next_ordinal = state.next_ordinal.max(parsed);
        parsed - 1
    } else {
        return Err(ShardlineError::malformed(format!(
            "unsupported SQL placeholder format '{trimmed}'"
        )));
    };

    if source_index >= params_len {
        return Err(ShardlineError::malformed(format!(
            "placeholder '{trimmed}' references parameter {} but only {} parameters were provided",
            source_index + 1,
            params_len
        )));
    }

    Ok(source_index)
}

fn parse_1_based_index(token: &str, numeric: &str) -> Result<usize, ShardlineError> {
    let parsed = numeric
        .parse::<usize>()
        .map_err(|_| ShardlineError::malformed(format!("invalid SQL placeholder '{token}'")))?;
    if parsed == 0 {
        return Err(ShardlineError::malformed(format!(
            "invalid SQL placeholder '{token}'"
        )));
    }
    Ok(parsed)
}

use sqlparser::tokenizer::{Location, Span};

use super::statement::TextSpan;

/// Converts parser locations (1-based line, 1-based character column) into
/// byte offsets over the original SQL text.
pub(crate) struct SourceOffsets<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceOffsets<'a> {
    pub(crate) fn new(sql: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (index, byte) in sql.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(index + 1);
            }
        }
        Self { sql, line_starts }
    }

    pub(crate) fn offset(&self, location: Location) -> Option<usize> {
        if location.line == 0 || location.column == 0 {
            return None;
        }
        let line_index = usize::try_from(location.line - 1).ok()?;
        let line_start = *self.line_starts.get(line_index)?;
        let line_end = self
            .line_starts
            .get(line_index + 1)
            .copied()
            .unwrap_or(self.sql.len());
        let column = usize::try_from(location.column - 1).ok()?;
        let line = &self.sql[line_start..line_end];
        if column == line.chars().count() {
            return Some(line_end);
        }
        line.char_indices()
            .nth(column)
            .map(|(byte_index, _)| line_start + byte_index)
    }

    pub(crate) fn span(&self, span: Span) -> Option<TextSpan> {
        let start = self.offset(span.start)?;
        let stop = self.offset(span.end)?;
        if stop < start {
            return None;
        }
        Some(TextSpan::new(start, stop))
    }

    /// Walks left from `index` over whitespace and returns the offset of the
    /// first non-whitespace byte boundary, i.e. the end of the previous token.
    pub(crate) fn trim_whitespace_before(&self, index: usize) -> usize {
        let head = &self.sql[..index];
        head.trim_end().len()
    }

    /// Finds the byte offset of `needle` when it is the first
    /// non-whitespace character at or after `index`.
    pub(crate) fn next_char_at(&self, index: usize, needle: char) -> Option<usize> {
        let tail = &self.sql[index..];
        let trimmed = tail.trim_start();
        let offset = index + (tail.len() - trimmed.len());
        trimmed.starts_with(needle).then_some(offset)
    }

    /// Finds the byte offset of `needle` when it is the last
    /// non-whitespace character before `index`.
    pub(crate) fn prev_char_at(&self, index: usize, needle: char) -> Option<usize> {
        let end = self.trim_whitespace_before(index);
        self.sql[..end]
            .ends_with(needle)
            .then(|| end - needle.len_utf8())
    }

    /// Offset right after the token preceding the keyword that introduces
    /// the value at `index`, e.g. the end of `GROUP BY status` in
    /// `GROUP BY status LIMIT 1`.
    pub(crate) fn before_keyword(&self, index: usize) -> usize {
        let keyword_end = self.trim_whitespace_before(index);
        let keyword_start = self.sql[..keyword_end]
            .trim_end_matches(|ch: char| ch.is_ascii_alphabetic())
            .len();
        self.trim_whitespace_before(keyword_start)
    }

    /// End of the statement text, ignoring trailing whitespace and `;`.
    pub(crate) fn statement_end(&self) -> usize {
        self.sql.trim_end().trim_end_matches(';').trim_end().len()
    }

    /// Offset where the select list ends, given the start of the first
    /// relation after `FROM`.
    pub(crate) fn select_list_end(&self, first_relation_start: usize) -> Option<usize> {
        let before_relation = self.trim_whitespace_before(first_relation_start);
        let head = &self.sql[..before_relation];
        if head.len() < 4 || !head.is_char_boundary(head.len() - 4) {
            return None;
        }
        let keyword = &head[head.len() - 4..];
        if !keyword.eq_ignore_ascii_case("from") {
            return None;
        }
        Some(self.trim_whitespace_before(head.len() - 4))
    }
}

#[cfg(test)]
mod tests {
    use super::SourceOffsets;
    use sqlparser::tokenizer::{Location, Span};

    #[test]
    fn converts_multiline_locations() {
        let sql = "SELECT a\nFROM t_order";
        let offsets = SourceOffsets::new(sql);
        assert_eq!(offsets.offset(Location::new(2, 6)), Some(14));
        assert_eq!(offsets.offset(Location::new(2, 13)), Some(21));
        let span = offsets
            .span(Span::new(Location::new(2, 6), Location::new(2, 13)))
            .expect("span");
        assert_eq!(&sql[span.start..span.stop], "t_order");
    }

    #[test]
    fn counts_columns_in_characters() {
        let sql = "SELECT 'é', x";
        let offsets = SourceOffsets::new(sql);
        let x = offsets.offset(Location::new(1, 13)).expect("offset");
        assert_eq!(&sql[x..], "x");
    }

    #[test]
    fn empty_locations_have_no_offset() {
        let offsets = SourceOffsets::new("SELECT 1");
        assert_eq!(offsets.offset(Location::new(0, 0)), None);
    }

    #[test]
    fn finds_select_list_end() {
        let sql = "SELECT a, b  FROM   t";
        let offsets = SourceOffsets::new(sql);
        assert_eq!(offsets.select_list_end(20), Some(11));
    }

    #[test]
    fn finds_clause_boundaries() {
        let sql = "SELECT a FROM t GROUP BY a  LIMIT 5 ;";
        let offsets = SourceOffsets::new(sql);
        let limit_value = sql.find('5').expect("limit value");
        assert_eq!(&sql[..offsets.before_keyword(limit_value)], "SELECT a FROM t GROUP BY a");
        assert_eq!(&sql[..offsets.statement_end()], "SELECT a FROM t GROUP BY a  LIMIT 5");
    }

    #[test]
    fn finds_surrounding_parentheses() {
        let sql = "VALUES ( 1, 2 )";
        let offsets = SourceOffsets::new(sql);
        assert_eq!(offsets.prev_char_at(9, '('), Some(7));
        assert_eq!(offsets.next_char_at(13, ')'), Some(14));
    }
}

//! Delimiter-separated rows with spreadsheet-style quoting.
//!
//! A field is wrapped in double quotes when it contains the delimiter, a
//! quote or a line break; quotes inside a quoted field are doubled. Quoted
//! fields may span lines, so any text round-trips exactly.
use std::io::{self, BufRead, Write};

use crate::error::{HyperadminError, Result};

pub const DEFAULT_DELIMITER: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    delimiter: char,
}

impl Default for Dialect {
    fn default() -> Self {
        Self { delimiter: DEFAULT_DELIMITER }
    }
}

impl Dialect {
    pub fn new(delimiter: char) -> Result<Self> {
        if matches!(delimiter, '"' | '\n' | '\r') {
            return Err(HyperadminError::Config(format!(
                "{delimiter:?} cannot be used as a field delimiter"
            )));
        }
        Ok(Self { delimiter })
    }
    pub fn delimiter(&self) -> char {
        self.delimiter
    }
    pub fn encode_field(&self, field: &str) -> String {
        let needs_quotes = field
            .chars()
            .any(|c| c == self.delimiter || matches!(c, '"' | '\n' | '\r'));
        if needs_quotes {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}

// ------------- Writing -------------
pub struct RowWriter<W: Write> {
    inner: W,
    dialect: Dialect,
    longest: usize,
}

impl<W: Write> RowWriter<W> {
    pub fn new(inner: W, dialect: Dialect) -> Self {
        Self { inner, dialect, longest: 0 }
    }
    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> io::Result<()> {
        let encoded: Vec<String> = fields
            .iter()
            .map(|f| self.dialect.encode_field(f.as_ref()))
            .collect();
        self.longest = encoded.iter().map(String::len).fold(self.longest, usize::max);
        let mut separator = [0u8; 4];
        let separator = self.dialect.delimiter.encode_utf8(&mut separator);
        writeln!(self.inner, "{}", encoded.join(separator))
    }
    /// Byte length of the longest encoded field written so far.
    pub fn longest_field(&self) -> usize {
        self.longest
    }
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

// ------------- Reading -------------
pub struct RowReader<R: BufRead> {
    inner: R,
    dialect: Dialect,
    rows: usize,
}

impl<R: BufRead> RowReader<R> {
    pub fn new(inner: R, dialect: Dialect) -> Self {
        Self { inner, dialect, rows: 0 }
    }

    fn next_row(&mut self) -> io::Result<Option<Vec<String>>> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut started = false;
        let mut line = String::new();
        loop {
            line.clear();
            if self.inner.read_line(&mut line)? == 0 {
                if in_quotes {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("row {}: unterminated quoted field", self.rows + 1),
                    ));
                }
                if !started {
                    return Ok(None);
                }
                fields.push(field);
                break;
            }
            // blank lines between rows carry no data
            if !started && line.trim_end_matches(['\r', '\n']).is_empty() {
                continue;
            }
            started = true;
            let mut chars = line.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            field.push('"');
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(c);
                    }
                } else if c == self.dialect.delimiter {
                    fields.push(std::mem::take(&mut field));
                } else if c == '"' && field.is_empty() {
                    in_quotes = true;
                } else if c == '\n' || (c == '\r' && chars.peek() == Some(&'\n')) {
                    // the line terminator, the loop ends on the '\n'
                } else {
                    field.push(c);
                }
            }
            if !in_quotes {
                fields.push(field);
                break;
            }
        }
        self.rows += 1;
        Ok(Some(fields))
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = io::Result<Vec<String>>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(rows: &[Vec<&str>], dialect: Dialect) -> (String, usize) {
        let mut writer = RowWriter::new(Vec::new(), dialect);
        for row in rows {
            writer.write_row(row).unwrap();
        }
        let longest = writer.longest_field();
        (String::from_utf8(writer.finish().unwrap()).unwrap(), longest)
    }

    #[test]
    fn awkward_fields_survive() {
        let rows = vec![
            vec!["plain", "with:colon", "say \"hi\""],
            vec!["two\nlines", "", "crlf\r\ninside"],
            vec!["\"", "::", "trailing\n"],
        ];
        let (text, _) = write(&rows, Dialect::default());
        let read: Vec<Vec<String>> = RowReader::new(text.as_bytes(), Dialect::default())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(read, rows);
    }

    #[test]
    fn longest_field_counts_quoting() {
        let (_, longest) = write(&[vec!["a:b", "abcd"]], Dialect::default());
        // "a:b" is written as "\"a:b\"" which is five bytes
        assert_eq!(longest, 5);
    }

    #[test]
    fn other_delimiters_and_blank_lines() {
        let dialect = Dialect::new('|').unwrap();
        let read: Vec<Vec<String>> = RowReader::new("a|b:c\n\n1|2\n".as_bytes(), dialect)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(read, vec![vec!["a", "b:c"], vec!["1", "2"]]);
        assert!(Dialect::new('"').is_err());
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut reader = RowReader::new("\"open:field\n".as_bytes(), Dialect::default());
        assert!(reader.next().unwrap().is_err());
    }
}

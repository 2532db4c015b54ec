//! CSV text to a rectangular row matrix
//!
//! Exports may come back with `,` `;` tab `|` or `:` separators depending
//! on locale and link shape, so the delimiter is guessed from a sample.

use csv::ReaderBuilder;

use crate::error::{Error, Result};

const CANDIDATE_DELIMITERS: [u8; 5] = [b',', b';', b'\t', b'|', b':'];

/// Rows inspected when guessing the delimiter
const GUESS_SAMPLE_ROWS: usize = 10;

/// Parse CSV text into rows padded to the widest row.
///
/// Double quotes delimit fields and a doubled quote escapes one. Empty
/// lines are skipped.
pub fn parse_csv_rows(text: &str) -> Result<Vec<Vec<String>>> {
    let delimiter = guess_delimiter(text);
    let mut reader = reader(text, delimiter);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::CsvParse(format!("CSV parse failed: {e}")))?;
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(pad_rows(rows))
}

/// Pad every row with empty cells up to the widest row.
pub fn pad_rows(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

fn reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes())
}

/// Pick the candidate giving the most consistent field count across the
/// sample, ties going to the one with more fields. Candidates averaging
/// fewer than two fields per row are ignored. Defaults to `,`.
fn guess_delimiter(text: &str) -> u8 {
    let mut best: Option<(u8, usize, f64)> = None;

    for delimiter in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = reader(text, delimiter)
            .records()
            .take(GUESS_SAMPLE_ROWS)
            .filter_map(|record| record.ok())
            .map(|record| record.len())
            .collect();
        if counts.is_empty() {
            continue;
        }

        let average = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        if average < 2.0 {
            continue;
        }
        let delta: usize = counts.windows(2).map(|w| w[0].abs_diff(w[1])).sum();

        let better = match best {
            None => true,
            Some((_, best_delta, best_average)) => {
                delta < best_delta || (delta == best_delta && average > best_average)
            }
        };
        if better {
            best = Some((delimiter, delta, average));
        }
    }

    best.map_or(b',', |(delimiter, _, _)| delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_rows() {
        let rows = parse_csv_rows("A,B\n1,2\n3,4\n").unwrap();
        assert_eq!(rows, vec![vec!["A", "B"], vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn guesses_semicolon_and_tab() {
        let rows = parse_csv_rows("Name;Amount\nRent;1.200,50\nFood;300,00").unwrap();
        assert_eq!(rows[1], vec!["Rent", "1.200,50"]);

        let rows = parse_csv_rows("a\tb\tc\n1\t2\t3").unwrap();
        assert_eq!(rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn guesses_pipe() {
        let rows = parse_csv_rows("x|y\n1|2").unwrap();
        assert_eq!(rows, vec![vec!["x", "y"], vec!["1", "2"]]);
    }

    #[test]
    fn quoted_fields_keep_delimiters_and_escaped_quotes() {
        let rows = parse_csv_rows("name,quote\n\"Doe, Jane\",\"she said \"\"hi\"\"\"").unwrap();
        assert_eq!(rows[1], vec!["Doe, Jane", "she said \"hi\""]);
    }

    #[test]
    fn skips_empty_lines_and_pads_ragged_rows() {
        let rows = parse_csv_rows("a,b,c\n\n1,2\n\n4\n").unwrap();
        assert_eq!(
            rows,
            vec![vec!["a", "b", "c"], vec!["1", "2", ""], vec!["4", "", ""]]
        );
    }

    #[test]
    fn single_column_defaults_to_comma() {
        let rows = parse_csv_rows("only\none").unwrap();
        assert_eq!(rows, vec![vec!["only"], vec!["one"]]);
    }

    #[test]
    fn empty_text_is_no_rows() {
        assert!(parse_csv_rows("").unwrap().is_empty());
    }
}

//! Text line format shared by segments and buckets
//!
//! ```text
//! term;docId:weight;docId:weight            (ranking)
//! term;docId:freq,pos1,pos2;docId:freq,pos1 (positional)
//! ```
//!
//! The merger checks that the postings part of a line parses, but keeps it
//! as a string: postings are concatenated with the term delimiter and only
//! decoded at query time.

use std::fmt::Write;
use std::path::Path;

use crate::base::{
    DocId, IndexMode, PositionalPosting, Posting, Weight, POSITION_DELIMITER, POSTINGS_DELIMITER,
    TERM_DELIMITER,
};
use crate::error::{Error, Result};

/// Formats a weight with two decimals
pub fn format_weight(weight: Weight) -> String {
    format!("{:.2}", weight)
}

/// Formats a ranking-mode line; postings must already be sorted by doc ID
pub fn format_line<'a, I>(term: &str, postings: I) -> String
where
    I: IntoIterator<Item = &'a Posting>,
{
    let mut line = String::from(term);
    for posting in postings {
        // Writing into a String cannot fail
        let _ = write!(
            line,
            "{}{}{}{:.2}",
            TERM_DELIMITER, posting.docid, POSTINGS_DELIMITER, posting.weight
        );
    }
    line
}

/// Formats a positional-mode line; postings must already be sorted by doc ID
pub fn format_positional_line<'a, I>(term: &str, postings: I) -> String
where
    I: IntoIterator<Item = &'a PositionalPosting>,
{
    let mut line = String::from(term);
    for posting in postings {
        let _ = write!(
            line,
            "{}{}{}{}",
            TERM_DELIMITER, posting.docid, POSTINGS_DELIMITER, posting.frequency
        );
        for position in posting.positions.iter() {
            let _ = write!(line, "{}{}", POSITION_DELIMITER, position);
        }
    }
    line
}

/// Term prefixes name bucket files, so terms cannot hold path separators
pub fn is_valid_term(term: &str) -> bool {
    !term.is_empty() && !term.contains(['/', '\\', '\0'])
}

/// Splits a line into its term and (raw) postings part
pub fn split_line<'a>(line: &'a str, path: &Path, line_no: usize) -> Result<(&'a str, &'a str)> {
    match line.split_once(TERM_DELIMITER) {
        Some(("", _)) => Err(Error::parse(path, line_no, "empty term")),
        Some((term, _)) if !is_valid_term(term) => Err(Error::parse(
            path,
            line_no,
            format!("term '{}' contains a path separator", term),
        )),
        Some((term, postings)) => Ok((term, postings)),
        None => Err(Error::parse(
            path,
            line_no,
            format!("missing term delimiter '{}'", TERM_DELIMITER),
        )),
    }
}

/// Guesses the index mode from a raw postings string
pub fn detect_mode(postings: &str) -> IndexMode {
    if postings.contains(POSITION_DELIMITER) {
        IndexMode::Positional
    } else {
        IndexMode::Ranking
    }
}

/// Checks that a raw postings string parses in the mode it looks like
pub fn check_postings(postings: &str, path: &Path, line_no: usize) -> Result<()> {
    if postings.is_empty() {
        return Err(Error::parse(path, line_no, "empty postings"));
    }
    match detect_mode(postings) {
        IndexMode::Ranking => parse_postings(postings, path, line_no).map(|_| ()),
        IndexMode::Positional => parse_positional_postings(postings, path, line_no).map(|_| ()),
    }
}

/// Joins two raw postings strings
pub fn append_postings(target: &mut String, postings: &str) {
    if !target.is_empty() {
        target.push(TERM_DELIMITER);
    }
    target.push_str(postings);
}

/// Number of posting groups in a raw postings string
///
/// This is the document frequency used for IDF. It counts groups, not
/// distinct document IDs.
pub fn count_posting_groups(postings: &str) -> usize {
    if postings.is_empty() {
        return 0;
    }
    postings.split(TERM_DELIMITER).count()
}

fn parse_docid(s: &str, path: &Path, line_no: usize) -> Result<DocId> {
    s.trim()
        .parse::<DocId>()
        .map_err(|_| Error::parse(path, line_no, format!("invalid document ID '{}'", s)))
}

/// Parses ranking-mode postings
pub fn parse_postings(postings: &str, path: &Path, line_no: usize) -> Result<Vec<Posting>> {
    let mut parsed = Vec::new();
    for group in postings.split(TERM_DELIMITER) {
        let (docid, weight) = group.split_once(POSTINGS_DELIMITER).ok_or_else(|| {
            Error::parse(
                path,
                line_no,
                format!("posting '{}' has no '{}'", group, POSTINGS_DELIMITER),
            )
        })?;
        let weight = weight
            .trim()
            .parse::<Weight>()
            .map_err(|_| Error::parse(path, line_no, format!("invalid weight '{}'", weight)))?;
        parsed.push(Posting {
            docid: parse_docid(docid, path, line_no)?,
            weight,
        });
    }
    Ok(parsed)
}

/// Parses positional-mode postings
pub fn parse_positional_postings(
    postings: &str,
    path: &Path,
    line_no: usize,
) -> Result<Vec<PositionalPosting>> {
    let mut parsed = Vec::new();
    for group in postings.split(TERM_DELIMITER) {
        let (docid, rest) = group.split_once(POSTINGS_DELIMITER).ok_or_else(|| {
            Error::parse(
                path,
                line_no,
                format!("posting '{}' has no '{}'", group, POSTINGS_DELIMITER),
            )
        })?;
        let mut values = rest.split(POSITION_DELIMITER);
        let frequency = values
            .next()
            .and_then(|f| f.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                Error::parse(path, line_no, format!("invalid frequency in '{}'", group))
            })?;
        let positions = values
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .map_err(|_| Error::parse(path, line_no, format!("invalid position '{}'", p)))
            })
            .collect::<Result<Vec<_>>>()?;
        parsed.push(PositionalPosting {
            docid: parse_docid(docid, path, line_no)?,
            frequency,
            positions,
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("test.ind")
    }

    #[test]
    fn ranking_line() {
        let postings = [
            Posting {
                docid: 1,
                weight: 0.707106,
            },
            Posting {
                docid: 7,
                weight: 1.,
            },
        ];
        let line = format_line("cat", postings.iter());
        assert_eq!(line, "cat;1:0.71;7:1.00");

        let (term, raw) = split_line(&line, &path(), 1).unwrap();
        assert_eq!(term, "cat");
        assert_eq!(count_posting_groups(raw), 2);

        let parsed = parse_postings(raw, &path(), 1).unwrap();
        assert_eq!(parsed[0].docid, 1);
        assert_eq!(parsed[0].weight, 0.71);
        assert_eq!(parsed[1].docid, 7);
    }

    #[test]
    fn positional_line() {
        let postings = [PositionalPosting {
            docid: 3,
            frequency: 2,
            positions: vec![0, 8],
        }];
        let line = format_positional_line("dog", postings.iter());
        assert_eq!(line, "dog;3:2,0,8");

        let (_, raw) = split_line(&line, &path(), 1).unwrap();
        assert_eq!(parse_positional_postings(raw, &path(), 1).unwrap(), postings);
        assert_eq!(detect_mode(raw), IndexMode::Positional);
        assert_eq!(detect_mode("3:0.25;4:1.00"), IndexMode::Ranking);
    }

    #[test]
    fn concatenation() {
        let mut merged = String::new();
        append_postings(&mut merged, "1:0.50;2:0.30");
        append_postings(&mut merged, "9:1.00");
        assert_eq!(merged, "1:0.50;2:0.30;9:1.00");
        assert_eq!(count_posting_groups(&merged), 3);
        assert_eq!(count_posting_groups(""), 0);
    }

    #[test]
    fn malformed_lines() {
        assert!(matches!(
            split_line("nodelimiter", &path(), 4),
            Err(Error::Parse { line: 4, .. })
        ));
        assert!(split_line(";1:0.5", &path(), 1).is_err());
        assert!(split_line("/etc;1:0.5", &path(), 1).is_err());
        assert!(split_line("a/b;1:0.5", &path(), 1).is_err());
        assert!(split_line("a\\b;1:0.5", &path(), 1).is_err());
        assert!(split_line("c++;1:0.5", &path(), 1).is_ok());
        assert!(parse_postings("1-0.5", &path(), 1).is_err());
        assert!(parse_postings("x:0.5", &path(), 1).is_err());
        assert!(parse_postings("1:abc", &path(), 1).is_err());
        assert!(parse_positional_postings("1:a,2", &path(), 1).is_err());
    }

    #[test]
    fn postings_are_checked() {
        assert!(check_postings("1:0.50;2:0.30", &path(), 1).is_ok());
        assert!(check_postings("3:2,0,8;4:1,5", &path(), 1).is_ok());
        assert!(matches!(
            check_postings("", &path(), 3),
            Err(Error::Parse { line: 3, .. })
        ));
        assert!(check_postings("x:abc", &path(), 1).is_err());
        assert!(check_postings("1:0.50;", &path(), 1).is_err());
        assert!(check_postings("1:2,x", &path(), 1).is_err());
    }
}

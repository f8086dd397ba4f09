//! Extracts ordered (name, declared-type) pairs from a `CREATE TABLE` statement's
//! column list, as manual token scanning rather than a regex engine or a full SQL
//! grammar — only the column list is needed here, not general DDL/DML parsing.

use crate::model::ColumnDef;

const CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK"];
const TYPE_STOP_KEYWORDS: &[&str] = &[
    "NOT", "NULL", "PRIMARY", "KEY", "UNIQUE", "CHECK", "DEFAULT", "COLLATE", "REFERENCES",
];

/// Finds the outermost parenthesized column list in a `CREATE TABLE` statement and
/// returns its contents, unparsed.
fn find_column_list(sql: &str) -> Option<&str> {
    let open = sql.find('(')?;
    let bytes = sql.as_bytes();
    let mut depth = 0i32;
    for (i, b) in bytes[open..].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&sql[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits `column_list` on top-level commas, i.e. commas not nested inside
/// parentheses (type modifiers like `NUMERIC(10,2)` must not be split).
fn split_top_level_commas(column_list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in column_list.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn is_constraint_line(tokens: &[&str]) -> bool {
    tokens
        .first()
        .map(|t| CONSTRAINT_KEYWORDS.contains(&t.to_uppercase().as_str()))
        .unwrap_or(true)
}

/// Parses one column-definition fragment (e.g. `b TEXT NOT NULL`) into a
/// `ColumnDef`, or `None` if it is a table-level constraint line.
fn parse_column_def(fragment: &str) -> Option<ColumnDef> {
    let tokens: Vec<&str> = fragment.split_whitespace().collect();
    if tokens.is_empty() || is_constraint_line(&tokens) {
        return None;
    }
    let name = tokens[0].trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']');
    let mut type_tokens = Vec::new();
    for token in &tokens[1..] {
        if TYPE_STOP_KEYWORDS.contains(&token.to_uppercase().as_str()) {
            break;
        }
        type_tokens.push(*token);
    }
    let declared_type = if type_tokens.is_empty() {
        "TEXT".to_string()
    } else {
        type_tokens.join(" ")
    };
    Some(ColumnDef {
        name: name.to_string(),
        declared_type,
    })
}

/// Extracts the ordered column list from a full `CREATE TABLE` statement. Returns
/// an empty vector (rather than an error) if no parenthesized list is found —
/// malformed schema SQL is evidence, not a bug to reject.
pub fn extract_columns(sql: &str) -> Vec<ColumnDef> {
    let Some(column_list) = find_column_list(sql) else {
        return Vec::new();
    };
    split_top_level_commas(column_list)
        .iter()
        .filter_map(|fragment| parse_column_def(fragment))
        .collect()
}

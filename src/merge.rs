//! Variable-data merge: `{{key}}` placeholders filled from one row.
//!
//! Text is extracted once as `(path, value)` pairs, each value goes
//! through the pure [`substitute_placeholders`], and only changed values
//! are written back. Nothing outside a text property is touched.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::surface::Personalize;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid"))
}

/// One personalization record. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizationRow {
    values: BTreeMap<String, String>,
}

impl PersonalizationRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.trim().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.trim().to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rows from a JSON array of flat objects. Numbers and booleans are
    /// stringified, `null` becomes an empty string.
    pub fn rows_from_json(json: &str) -> Result<Vec<Self>> {
        let parsed: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(json).map_err(|e| ExportError::invalid(format!("bad personalization rows: {e}")))?;
        parsed
            .into_iter()
            .enumerate()
            .map(|(i, object)| {
                let mut row = Self::new();
                for (key, value) in object {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => value.to_string(),
                        other => {
                            return Err(ExportError::invalid(format!(
                                "row {}: field '{key}' must be a scalar, got {other}",
                                i + 1
                            )))
                        }
                    };
                    row.insert(&key, text);
                }
                Ok(row)
            })
            .collect()
    }

    /// Rows from CSV with a header line; header cells become keys.
    pub fn rows_from_csv<R: Read>(reader: R) -> Result<Vec<Self>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| ExportError::invalid(format!("bad CSV header: {e}")))?
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| ExportError::invalid(format!("bad CSV record: {e}")))?;
            let mut row = Self::new();
            for (key, value) in headers.iter().zip(record.iter()) {
                if !key.is_empty() {
                    row.insert(key, value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for PersonalizationRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (k, v) in iter {
            row.insert(k.as_ref(), v);
        }
        row
    }
}

/// Replace every `{{key}}` whose key is in `row`. Unknown keys are left
/// exactly as written.
pub fn substitute_placeholders(template: &str, row: &PersonalizationRow) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| match row.get(&caps[1]) {
            Some(value) if !caps[1].is_empty() => value.to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Apply `row` to every text property of `doc`. Returns how many
/// properties changed.
pub fn personalize<D>(doc: &mut D, row: &PersonalizationRow) -> Result<usize>
where
    D: Personalize + ?Sized,
{
    let mut changed = 0;
    for field in doc.text_fields() {
        let merged = substitute_placeholders(&field.value, row);
        if merged != field.value {
            doc.write_text(&field.path, merged)?;
            changed += 1;
        }
    }
    log::debug!("personalized {changed} text properties");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{SurfaceError, TextField, TextPath};

    fn row() -> PersonalizationRow {
        PersonalizationRow::new().with("Name", "Ada").with("city", "London")
    }

    #[test]
    fn keys_match_case_insensitively() {
        assert_eq!(substitute_placeholders("Hi {{name}} from {{CITY}}", &row()), "Hi Ada from London");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        assert_eq!(substitute_placeholders("{{ name }}!", &row()), "Ada!");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        assert_eq!(
            substitute_placeholders("Dear {{ title }} {{name}}, {{}}", &row()),
            "Dear {{ title }} Ada, {{}}"
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let row = PersonalizationRow::new().with("a", "{{b}}").with("b", "x");
        assert_eq!(substitute_placeholders("{{a}}", &row), "{{b}}");
    }

    #[test]
    fn json_rows() {
        let rows = PersonalizationRow::rows_from_json(r#"[{"Name": "Ada", "age": 36, "vip": true, "note": null}]"#)
            .unwrap();
        assert_eq!(rows[0].get("name"), Some("Ada"));
        assert_eq!(rows[0].get("AGE"), Some("36"));
        assert_eq!(rows[0].get("vip"), Some("true"));
        assert_eq!(rows[0].get("note"), Some(""));
        assert!(PersonalizationRow::rows_from_json(r#"[{"a": [1]}]"#).is_err());
        assert!(PersonalizationRow::rows_from_json("{}").is_err());
    }

    #[test]
    fn csv_rows() {
        let data = "Name, City\nAda, London\nGrace,Arlington\n";
        let rows = PersonalizationRow::rows_from_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("city"), Some("Arlington"));
        assert_eq!(rows[0].get("NAME"), Some("Ada"));
    }

    struct Card {
        texts: Vec<String>,
        writes: usize,
    }

    impl Personalize for Card {
        fn text_fields(&self) -> Vec<TextField> {
            self.texts
                .iter()
                .enumerate()
                .map(|(i, t)| TextField {
                    path: TextPath(format!("/texts/{i}")),
                    value: t.clone(),
                })
                .collect()
        }

        fn write_text(&mut self, path: &TextPath, value: String) -> std::result::Result<(), SurfaceError> {
            let i: usize = path
                .0
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| SurfaceError::new("bad path"))?;
            self.writes += 1;
            self.texts[i] = value;
            Ok(())
        }
    }

    #[test]
    fn personalize_writes_back_only_changed_fields() {
        let mut card = Card {
            texts: vec!["Happy birthday {{name}}".into(), "static".into(), "{{unknown}}".into()],
            writes: 0,
        };
        let changed = personalize(&mut card, &row()).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(card.writes, 1);
        assert_eq!(card.texts, vec!["Happy birthday Ada", "static", "{{unknown}}"]);
    }
}

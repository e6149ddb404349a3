use crate::{
    result::{JetError, Result},
    scan,
};
use serde::{Deserialize, Serialize};

/// Wire-level parameter marker convention of the underlying driver.
///
/// Access is reachable over two driver families with different tastes: OLE DB
/// accepts named markers, ODBC insists on bare `?`. `Named` leaves `@name`
/// markers in the text (SQLite binds the `@` sigil natively); `Positional`
/// rewrites every named marker to `?` during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStyle {
    #[default]
    Named,
    Positional,
}

/// A single bound parameter: an optional name plus a JSON-typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct JetParameter {
    pub name: Option<String>,
    pub value: serde_json::Value,
}

impl JetParameter {
    /// A named parameter; the name may be given with or without its `@` sigil.
    pub fn named(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        JetParameter {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    /// A positional parameter, matched to `?` markers by order alone.
    pub fn positional(value: impl Into<serde_json::Value>) -> Self {
        JetParameter {
            name: None,
            value: value.into(),
        }
    }

    /// Name with any leading `@` sigil removed.
    pub fn bare_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(|name| name.strip_prefix('@').unwrap_or(name))
    }
}

/// A textual parameter marker located outside any quoted region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the marker sigil in the scanned text.
    pub offset: usize,
    /// Byte length of the whole marker (`1` for `?`).
    pub len: usize,
    /// `Some` for `@name` markers, `None` for positional `?`.
    pub name: Option<String>,
}

/// All parameter markers in `sql`, in textual order.
///
/// A `@` directly followed or preceded by another `@` introduces a global
/// variable token like `@@identity`, never a parameter. A lone `@` with no
/// word characters after it is not a marker either.
pub fn placeholder_positions(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    for offset in scan::marker_positions(sql, &['@', '?']) {
        if bytes[offset] == b'?' {
            found.push(Placeholder {
                offset,
                len: 1,
                name: None,
            });
            continue;
        }
        if offset > 0 && bytes[offset - 1] == b'@' {
            continue;
        }
        if bytes.get(offset + 1) == Some(&b'@') {
            continue;
        }
        let name: String = sql[offset + 1..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            continue;
        }
        found.push(Placeholder {
            offset,
            len: 1 + name.len(),
            name: Some(name),
        });
    }
    found
}

/// Matches command text against bound parameters and produces the effective
/// text plus one resolved parameter per marker, in marker order.
///
/// Positional (`?`) markers are matched to the bound list by order and their
/// count must agree exactly. Named (`@name`) markers are resolved against the
/// bound collection by exact name, then by name without the `@` sigil, then
/// by an earlier occurrence of the same placeholder; mixing both marker kinds
/// in one command is rejected. Under [`MarkerStyle::Positional`] every named
/// marker in the returned text is rewritten to `?`.
///
/// The bound slice is never consumed, so a command can be executed again
/// with the same bindings.
pub fn expand(
    text: &str,
    bound: &[JetParameter],
    style: MarkerStyle,
) -> Result<(String, Vec<JetParameter>)> {
    let placeholders = placeholder_positions(text);
    if placeholders.is_empty() {
        // nothing to match; bound parameters are simply not referenced
        return Ok((text.to_string(), Vec::new()));
    }

    let named = placeholders.iter().filter(|ph| ph.name.is_some()).count();
    let positional = placeholders.len() - named;
    if named > 0 && positional > 0 {
        return Err(JetError::MixedPlaceholderStyles);
    }

    if named == 0 {
        if positional != bound.len() {
            return Err(JetError::PlaceholderCountMismatch {
                placeholders: positional,
                supplied: bound.len(),
            });
        }
        return Ok((text.to_string(), bound.to_vec()));
    }

    let mut resolved: Vec<JetParameter> = Vec::with_capacity(placeholders.len());
    let mut slot_names: Vec<&str> = Vec::with_capacity(placeholders.len());
    for ph in &placeholders {
        let name = match ph.name.as_deref() {
            Some(name) => name,
            None => return Err(JetError::MixedPlaceholderStyles),
        };
        let sigiled = format!("@{name}");
        let hit = bound
            .iter()
            .find(|p| p.name.as_deref() == Some(sigiled.as_str()))
            .or_else(|| bound.iter().find(|p| p.name.as_deref() == Some(name)));
        let param = match hit {
            Some(param) => param.clone(),
            None => match slot_names.iter().position(|n| *n == name) {
                Some(earlier) => resolved[earlier].clone(),
                None => return Err(JetError::ParameterNotProvided(sigiled)),
            },
        };
        slot_names.push(name);
        resolved.push(param);
    }

    let mut out = text.to_string();
    if style == MarkerStyle::Positional {
        // splice highest offset first so earlier edits keep later offsets valid
        for ph in placeholders.iter().rev() {
            if ph.name.is_some() {
                out.replace_range(ph.offset..ph.offset + ph.len, "?");
            }
        }
    }
    Ok((out, resolved))
}

/// Converts a JSON parameter value into the concrete value bound to the
/// driver. Booleans ride as integers; arrays of byte values become blobs.
pub(crate) fn sql_value(value: &serde_json::Value) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value as SqlValue;
    match value {
        serde_json::Value::Null => Ok(SqlValue::Null),
        serde_json::Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(JetError::type_mismatch("integer or float", n.to_string()))
            }
        }
        serde_json::Value::String(s) => Ok(SqlValue::Text(s.clone())),
        serde_json::Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_u64() {
                    Some(b) if b <= 255 => bytes.push(b as u8),
                    _ => {
                        return Err(JetError::type_mismatch(
                            format!("byte values (0-255) at index {i}"),
                            item.to_string(),
                        ));
                    }
                }
            }
            Ok(SqlValue::Blob(bytes))
        }
        serde_json::Value::Object(_) => Err(JetError::type_mismatch(
            "null, boolean, number, string or byte array",
            value.to_string(),
        )),
    }
}

/// Integer view of a parameter, for markers consumed by the rewrite passes.
pub(crate) fn integer_value(param: &JetParameter) -> Result<i64> {
    param
        .value
        .as_i64()
        .ok_or_else(|| JetError::type_mismatch("integer", param.value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positional_markers_pass_through() {
        let bound = vec![JetParameter::positional(1), JetParameter::positional("x")];
        let (text, resolved) =
            expand("SELECT * FROM t WHERE a = ? AND b = ?", &bound, MarkerStyle::Named).unwrap();
        assert_eq!(text, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(resolved, bound);
    }

    #[test]
    fn test_positional_count_mismatch_rejected() {
        let err = expand("SELECT * FROM T WHERE A = ?", &[], MarkerStyle::Named).unwrap_err();
        assert!(matches!(
            err,
            JetError::PlaceholderCountMismatch {
                placeholders: 1,
                supplied: 0
            }
        ));
    }

    #[test]
    fn test_mixed_marker_kinds_rejected() {
        let bound = vec![JetParameter::positional(1), JetParameter::named("b", 2)];
        let err = expand("SELECT ? + @b", &bound, MarkerStyle::Named).unwrap_err();
        assert!(matches!(err, JetError::MixedPlaceholderStyles));
    }

    #[test]
    fn test_named_markers_match_exact_then_bare() {
        let bound = vec![
            JetParameter::named("@a", 1),
            JetParameter::named("b", "two"),
        ];
        let (text, resolved) =
            expand("SELECT @a, @b", &bound, MarkerStyle::Named).unwrap();
        assert_eq!(text, "SELECT @a, @b");
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].value, json!(1));
        assert_eq!(resolved[1].value, json!("two"));
    }

    #[test]
    fn test_repeated_placeholder_reuses_earlier_slot() {
        // second @a resolves by name again, third would fall back to the
        // earlier slot if the collection stopped matching
        let bound = vec![JetParameter::named("a", 7)];
        let (_, resolved) =
            expand("SELECT @a WHERE @a = @a", &bound, MarkerStyle::Named).unwrap();
        assert_eq!(resolved.len(), 3);
        assert!(resolved.iter().all(|p| p.value == json!(7)));
    }

    #[test]
    fn test_unmatched_named_marker_rejected() {
        let err = expand("SELECT @missing", &[], MarkerStyle::Named).unwrap_err();
        match err {
            JetError::ParameterNotProvided(name) => assert_eq!(name, "@missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_positional_style_rewrites_named_markers() {
        let bound = vec![
            JetParameter::named("first", 1),
            JetParameter::named("second_one", 2),
        ];
        let (text, resolved) = expand(
            "UPDATE t SET a = @first WHERE b = @second_one OR c = @first",
            &bound,
            MarkerStyle::Positional,
        )
        .unwrap();
        assert_eq!(text, "UPDATE t SET a = ? WHERE b = ? OR c = ?");
        assert_eq!(
            resolved.iter().map(|p| p.value.clone()).collect::<Vec<_>>(),
            vec![json!(1), json!(2), json!(1)]
        );
    }

    #[test]
    fn test_quoted_markers_are_not_placeholders() {
        let (text, resolved) = expand(
            "SELECT 'mail@example.com' FROM t WHERE a = @a",
            &[JetParameter::named("a", 9)],
            MarkerStyle::Positional,
        )
        .unwrap();
        assert_eq!(text, "SELECT 'mail@example.com' FROM t WHERE a = ?");
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_global_tokens_are_not_placeholders() {
        assert!(placeholder_positions("SELECT @@identity").is_empty());
        assert!(placeholder_positions("SELECT @@rowcount, @@identity").is_empty());
        let markers = placeholder_positions("SELECT @@identity, @real");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].name.as_deref(), Some("real"));
    }

    #[test]
    fn test_lone_sigil_is_not_a_placeholder() {
        assert!(placeholder_positions("SELECT 1 @ 2").is_empty());
    }

    #[test]
    fn test_no_markers_ignores_bound_parameters() {
        let bound = vec![JetParameter::positional(1)];
        let (text, resolved) = expand("SELECT 1", &bound, MarkerStyle::Named).unwrap();
        assert_eq!(text, "SELECT 1");
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_sql_value_conversions() {
        use rusqlite::types::Value as SqlValue;
        assert_eq!(sql_value(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(sql_value(&json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(sql_value(&json!(false)).unwrap(), SqlValue::Integer(0));
        assert_eq!(sql_value(&json!(42)).unwrap(), SqlValue::Integer(42));
        assert_eq!(sql_value(&json!(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(
            sql_value(&json!("hi")).unwrap(),
            SqlValue::Text("hi".to_string())
        );
        assert_eq!(
            sql_value(&json!([1, 2, 255])).unwrap(),
            SqlValue::Blob(vec![1, 2, 255])
        );
    }

    #[test]
    fn test_sql_value_rejects_bad_blob_and_objects() {
        let err = sql_value(&json!([1, 256, 3])).unwrap_err();
        match err {
            JetError::ParameterTypeMismatch { expected, got } => {
                assert!(expected.contains("index 1"));
                assert_eq!(got, "256");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sql_value(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_bare_name_strips_sigil() {
        assert_eq!(JetParameter::named("@p", 1).bare_name(), Some("p"));
        assert_eq!(JetParameter::named("p", 1).bare_name(), Some("p"));
        assert_eq!(JetParameter::positional(1).bare_name(), None);
    }
}

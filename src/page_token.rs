//! Opaque pagination token: base64(standard) of UTF-8 JSON. Produced at
//! the end of a paged call, accepted verbatim on the next one.
use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Wire keys: `fields, filter, order, offsets, cursor`. Absent keys
/// default to empty. `offsets` (offset mode) and `cursor` (cursor mode)
/// are mutually exclusive within a single response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageToken {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
    /// per-source consumed offsets; a negative value is an exhausted
    /// source's tombstone
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub offsets: BTreeMap<String, i64>,
    /// last returned row's sort-key values, stringified
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cursor: BTreeMap<String, String>,
}

impl PageToken {
    pub fn pack(&self) -> String {
        let json = serde_json::to_vec(self).expect("page token serializes");
        STANDARD.encode(json)
    }

    pub fn unpack(token: &str) -> Result<Self, DbError> {
        let bytes = STANDARD
            .decode(token)
            .map_err(|e| DbError::BadInput(format!("invalid page token encoding: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DbError::BadInput(format!("invalid page token payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn full_token() -> PageToken {
        let mut token = PageToken {
            fields: vec!["id".into(), "state".into()],
            order: vec!["asc(state)".into(), "asc(id)".into()],
            ..Default::default()
        };
        token
            .filter
            .insert("state".into(), vec!["ne(failed)".into()]);
        token.cursor.insert("state".into(), "completed".into());
        token.cursor.insert("id".into(), "10".into());
        token
    }

    #[rstest]
    #[case(PageToken::default())]
    #[case(full_token())]
    #[case(PageToken { offsets: [("db1".to_string(), 42i64), ("db2".to_string(), -1)].into_iter().collect(), ..Default::default() })]
    fn round_trip(#[case] token: PageToken) {
        assert_eq!(PageToken::unpack(&token.pack()).unwrap(), token);
    }

    #[test]
    fn wire_keys_are_lowercase_json() {
        let packed = full_token().pack();
        let json = String::from_utf8(STANDARD.decode(packed).unwrap()).unwrap();
        for key in ["fields", "filter", "order", "cursor"] {
            assert!(json.contains(&format!("\"{key}\"")), "missing {key} in {json}");
        }
        assert!(!json.contains("offsets"));
    }

    #[test]
    fn absent_keys_default() {
        let empty = STANDARD.encode("{}");
        let token = PageToken::unpack(&empty).unwrap();
        assert_eq!(token, PageToken::default());
    }

    #[test]
    fn garbage_is_bad_input() {
        assert!(matches!(
            PageToken::unpack("!!!"),
            Err(DbError::BadInput(_))
        ));
        let not_json = STANDARD.encode("hello");
        assert!(matches!(
            PageToken::unpack(&not_json),
            Err(DbError::BadInput(_))
        ));
    }
}

//! Envelope records and the decoded response model.

use serde::Deserialize;
use serde_json::Value;

/// One wire record: a mapping from field names to values, shaped by the
/// active [`Dialect`](crate::Dialect).
///
/// The default `serde_json` map keeps its keys sorted, so a given envelope
/// always serializes to the same bytes.
pub type Envelope = serde_json::Map<String, Value>;

/// A response as received from the server for an earlier request.
///
/// `result` and `error` are mutually exclusive by contract; the envelope
/// format does not enforce this structurally, and neither does decoding.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Id of the originating request. A record without an id decodes as 0.
    #[serde(default)]
    pub id: u64,

    /// Successful result value, if any.
    #[serde(default)]
    pub result: Option<Value>,

    /// Application-level error returned by the server, if any. Delivered as
    /// normal data; this is not a transport failure.
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

/// Application error carried inside a response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,

    /// Human-readable message.
    pub message: String,

    /// Optional auxiliary data.
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_result_response() {
        let res: Response =
            serde_json::from_str(r#"{"id":0,"result":["a","list","of","strings"]}"#).unwrap();
        assert_eq!(res.id, 0);
        assert!(res.error.is_none());
        assert_eq!(res.result, Some(json!(["a", "list", "of", "strings"])));
    }

    #[test]
    fn test_decode_error_response() {
        let res: Response =
            serde_json::from_str(r#"{"id":2,"error":{"code":-42,"message":"no you"}}"#).unwrap();
        assert_eq!(res.id, 2);
        assert!(res.result.is_none());
        let err = res.error.unwrap();
        assert_eq!(err.code, -42);
        assert_eq!(err.message, "no you");
        assert!(err.data.is_none());
    }

    #[test]
    fn test_decode_error_data() {
        let res: Response = serde_json::from_str(
            r#"{"id":1,"error":{"code":-1,"message":"denied","data":{"retry":false}}}"#,
        )
        .unwrap();
        assert_eq!(res.error.unwrap().data, Some(json!({"retry": false})));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let res: Response =
            serde_json::from_str(r#"{"id":3,"jsonrpc":"2.0","result":null,"extra":1}"#).unwrap();
        assert_eq!(res.id, 3);
    }

    #[test]
    fn test_missing_id_decodes_as_zero() {
        let res: Response = serde_json::from_str(r#"{"result":"ok"}"#).unwrap();
        assert_eq!(res.id, 0);
    }

    #[test]
    fn test_unparsable_record() {
        assert!(serde_json::from_str::<Response>("parse this if you can").is_err());
    }
}

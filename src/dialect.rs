//! Wire-envelope dialects.
//!
//! A [`Dialect`] decides how a call or notification is shaped into a wire
//! envelope. Two implementations are provided:
//!
//! - [`StandardDialect`] - the JSON-RPC 2.0 field set
//! - [`TaggedDialect`] - vendor variant that promotes the first parameter to
//!   a top-level `tags` field and omits the version marker
//!
//! Dialects are stateless and can be shared across any number of
//! connections.

use serde_json::{json, Value};

use crate::response::Envelope;

/// Strategy defining the wire shape of requests and notifications.
///
/// Implementations must be pure transformations: the same inputs always
/// produce the same envelope, and no state is carried between calls.
pub trait Dialect: Send + Sync {
    /// Build a request envelope carrying the given call id.
    fn request(&self, id: u64, method: &str, params: Vec<Value>) -> Envelope;

    /// Build a notification envelope. Notifications carry no id and never
    /// receive a response.
    fn notification(&self, method: &str, params: Vec<Value>) -> Envelope;
}

/// The JSON-RPC 2.0 dialect as described in
/// <https://www.jsonrpc.org/specification>.
///
/// Parameters are sent verbatim as the method arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl Dialect for StandardDialect {
    fn request(&self, id: u64, method: &str, params: Vec<Value>) -> Envelope {
        let mut env = Envelope::new();
        env.insert("id".to_string(), json!(id));
        env.insert("method".to_string(), Value::String(method.to_string()));
        env.insert("params".to_string(), Value::Array(params));
        env.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
        env
    }

    fn notification(&self, method: &str, params: Vec<Value>) -> Envelope {
        let mut env = Envelope::new();
        env.insert("method".to_string(), Value::String(method.to_string()));
        env.insert("params".to_string(), Value::Array(params));
        env.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
        env
    }
}

/// Vendor dialect differing from JSON-RPC 2.0 by omitting the `jsonrpc`
/// version field and adding a `tags` field.
///
/// The first parameter of every call and notification is the tag list and is
/// lifted out of `params` into the top-level `tags` field. Callers using
/// this dialect must always pass the tag list as their first argument; it
/// may be `Value::Null` or an empty array. A missing first parameter
/// encodes as `"tags":null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedDialect;

impl Dialect for TaggedDialect {
    fn request(&self, id: u64, method: &str, mut params: Vec<Value>) -> Envelope {
        let tags = take_tags(&mut params);
        let mut env = Envelope::new();
        env.insert("id".to_string(), json!(id));
        env.insert("method".to_string(), Value::String(method.to_string()));
        env.insert("params".to_string(), Value::Array(params));
        env.insert("tags".to_string(), tags);
        env
    }

    fn notification(&self, method: &str, mut params: Vec<Value>) -> Envelope {
        let tags = take_tags(&mut params);
        let mut env = Envelope::new();
        env.insert("method".to_string(), Value::String(method.to_string()));
        env.insert("params".to_string(), Value::Array(params));
        env.insert("tags".to_string(), tags);
        env
    }
}

/// Split the tag list off the front of the parameter list.
fn take_tags(params: &mut Vec<Value>) -> Value {
    if params.is_empty() {
        Value::Null
    } else {
        params.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json(env: &Envelope) -> String {
        serde_json::to_string(env).unwrap()
    }

    #[test]
    fn test_standard_request() {
        let env = StandardDialect.request(0, "system.login", vec![json!("admin"), json!("test")]);
        assert_eq!(
            to_json(&env),
            r#"{"id":0,"jsonrpc":"2.0","method":"system.login","params":["admin","test"]}"#
        );
    }

    #[test]
    fn test_standard_notification() {
        let env = StandardDialect.notification("system.login", vec![json!("admin"), json!("test")]);
        assert_eq!(
            to_json(&env),
            r#"{"jsonrpc":"2.0","method":"system.login","params":["admin","test"]}"#
        );
    }

    #[test]
    fn test_tagged_request() {
        let env = TaggedDialect.request(
            0,
            "system.login",
            vec![json!(["foo", "bar"]), json!("admin"), json!("test")],
        );
        assert_eq!(
            to_json(&env),
            r#"{"id":0,"method":"system.login","params":["admin","test"],"tags":["foo","bar"]}"#
        );
    }

    #[test]
    fn test_tagged_request_omits_version_field() {
        let env = TaggedDialect.request(7, "system.ping", vec![Value::Null]);
        assert!(env.get("jsonrpc").is_none());
        assert_eq!(env.get("tags"), Some(&Value::Null));
    }

    #[test]
    fn test_tagged_notification_null_tags() {
        let env = TaggedDialect.notification(
            "system.login",
            vec![Value::Null, json!("admin"), json!("test")],
        );
        assert_eq!(
            to_json(&env),
            r#"{"method":"system.login","params":["admin","test"],"tags":null}"#
        );
    }

    #[test]
    fn test_tagged_empty_params() {
        let env = TaggedDialect.request(0, "system.ping", vec![]);
        assert_eq!(
            to_json(&env),
            r#"{"id":0,"method":"system.ping","params":[],"tags":null}"#
        );
    }
}

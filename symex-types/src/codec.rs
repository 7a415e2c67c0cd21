//! Tagged textual form of the type model.
//!
//! Every variant is written as a JSON object whose `type` field names the
//! variant; decoding dispatches on that field first and fails on anything it
//! does not know.

use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::types::{canonical_order, canonicalize, FunctionType, InterfaceMethod, Type};

#[derive(Debug, Error, Diagnostic)]
#[error("format error: {message}")]
#[diagnostic(code(symex::format))]
pub struct FormatError {
    pub message: String,
}

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::new(err.to_string())
    }
}

pub fn encode(t: &Type) -> Result<String, FormatError> {
    Ok(serde_json::to_string(t)?)
}

pub fn decode(text: &str) -> Result<Type, FormatError> {
    Ok(serde_json::from_str(text)?)
}

pub fn to_value(t: &Type) -> Result<serde_json::Value, FormatError> {
    Ok(serde_json::to_value(t)?)
}

pub fn from_value(value: serde_json::Value) -> Result<Type, FormatError> {
    Ok(serde_json::from_value(value)?)
}

/// Serialize any persisted record, compact or indented.
pub fn write_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, FormatError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

pub fn read_json<T: DeserializeOwned>(text: &str) -> Result<T, FormatError> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn serialize_canonical<S>(methods: &[InterfaceMethod], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    canonical_order(methods).serialize(serializer)
}

pub(crate) fn canonical_methods<'de, D>(deserializer: D) -> Result<Vec<InterfaceMethod>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut methods = Vec::<InterfaceMethod>::deserialize(deserializer)?;
    canonicalize(&mut methods);
    Ok(methods)
}

/// A method's `def` is written as a full `function` record.
pub(crate) mod tagged_function {
    use super::*;
    use serde::Serializer;

    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "lowercase")]
    enum Tagged<'a> {
        Function(&'a FunctionType),
    }

    #[derive(Deserialize)]
    #[serde(tag = "type", rename_all = "lowercase")]
    enum Owned {
        Function(FunctionType),
    }

    pub fn serialize<S: Serializer>(def: &FunctionType, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged::Function(def).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FunctionType, D::Error> {
        let Owned::Function(def) = Owned::deserialize(deserializer)?;
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChanDir;

    #[test]
    fn builtin_encodes_with_discriminator() {
        let text = encode(&Type::builtin("int")).expect("encode");
        assert_eq!(text, r#"{"type":"builtin","name":"int","untyped":false}"#);
    }

    #[test]
    fn method_def_is_a_tagged_function() {
        let m = Type::method(
            Type::pointer(Type::ident("p", "T")),
            FunctionType::new(vec![], vec![Type::builtin("int")]),
        );
        let value = to_value(&m).expect("encode");
        assert_eq!(value["type"], "method");
        assert_eq!(value["def"]["type"], "function");
        assert_eq!(value["receiver"]["target"]["name"], "T");
        assert_eq!(from_value(value).expect("decode"), m);
    }

    #[test]
    fn method_def_with_wrong_tag_is_rejected() {
        let text = r#"{"type":"method","receiver":{"type":"nil"},"def":{"type":"slice","element":{"type":"nil"}}}"#;
        assert!(decode(text).is_err());
    }

    #[test]
    fn unknown_discriminator_is_a_format_error() {
        let err = decode(r#"{"type":"tuple","items":[]}"#).expect_err("should fail");
        assert!(err.message.contains("tuple"), "{}", err.message);
    }

    #[test]
    fn missing_discriminator_is_a_format_error() {
        assert!(decode(r#"{"name":"int"}"#).is_err());
    }

    #[test]
    fn decoded_interfaces_are_canonical() {
        let text = r#"{"type":"interface","methods":[
            {"name":"Z","def":{"type":"function","params":[],"results":[],"variadic":false}},
            {"name":"A","def":{"type":"function","params":[],"results":[],"variadic":false}}]}"#;
        let Type::Interface { methods } = decode(text).expect("decode") else {
            panic!("expected interface");
        };
        assert_eq!(methods[0].name, "A");
        assert_eq!(methods[1].name, "Z");
    }

    #[test]
    fn interfaces_encode_in_canonical_order() {
        let f = Type::function(vec![], vec![]);
        let raw = Type::Interface {
            methods: vec![
                InterfaceMethod::new("Z", "p", f.clone()),
                InterfaceMethod::new("A", "p", f),
            ],
        };
        let text = encode(&raw).expect("encode");
        assert!(text.find("\"A\"") < text.find("\"Z\""), "{text}");
        assert_eq!(decode(&text).expect("decode"), raw);
    }

    #[test]
    fn channel_direction_spelling() {
        let value = to_value(&Type::channel(ChanDir::Bidir, Type::builtin("int"))).expect("encode");
        assert_eq!(value["dir"], "bidir");
    }

    #[test]
    fn absent_array_length_is_omitted() {
        let text = encode(&Type::array(Type::builtin("byte"), None)).expect("encode");
        assert!(!text.contains("length"));
        assert_eq!(decode(&text).expect("decode"), Type::array(Type::builtin("byte"), None));
    }
}

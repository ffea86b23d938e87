//! Positional parameter binding.

use super::error::RpcError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The positional parameter list of one request.
///
/// A `params` payload that is a JSON array binds positionally; any
/// other single value is treated as a one-element list, and a missing
/// payload as empty. Positions past the end of the list (or explicit
/// `null`) bind to the argument type's default, matching the
/// permissive tail-argument handling of mainstream gateways.
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<Value>);

impl Params {
    #[must_use]
    pub fn new(raw: Option<Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self(Vec::new()),
            Some(Value::Array(list)) => Self(list),
            Some(single) => Self(vec![single]),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Binds position `index` to `T`. A decode failure names the
    /// position in the error message.
    pub fn bind<T: DeserializeOwned + Default>(&self, index: usize) -> Result<T, RpcError> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| RpcError::invalid_params(format!("invalid param {index}: {e}"))),
        }
    }

    /// Binds position `index`, rejecting a missing value.
    pub fn bind_required<T: DeserializeOwned>(&self, index: usize) -> Result<T, RpcError> {
        match self.0.get(index) {
            None | Some(Value::Null) => {
                Err(RpcError::invalid_params(format!("missing param {index}")))
            }
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| RpcError::invalid_params(format!("invalid param {index}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use serde_json::json;

    #[test]
    fn array_binds_positionally() {
        let params = Params::new(Some(json!(["0x10", true])));
        let tag: String = params.bind(0).unwrap();
        let full: bool = params.bind(1).unwrap();
        assert_eq!(tag, "0x10");
        assert!(full);
    }

    #[test]
    fn single_value_becomes_one_element_list() {
        let params = Params::new(Some(json!("latest")));
        assert_eq!(params.len(), 1);
        let tag: String = params.bind(0).unwrap();
        assert_eq!(tag, "latest");
    }

    #[test]
    fn missing_tail_binds_default() {
        let params = Params::new(Some(json!(["latest"])));
        let full: bool = params.bind(1).unwrap();
        assert!(!full);
    }

    #[test]
    fn decode_failure_names_the_position() {
        let params = Params::new(Some(json!(["latest", "not-a-bool"])));
        let err = params.bind::<bool>(1).unwrap_err();
        assert_eq!(err.code, super::super::error::code::INVALID_PARAMS);
        assert!(err.message.contains("param 1"), "message: {}", err.message);
    }

    #[test]
    fn typed_primitives_bind_from_hex_strings() {
        let params =
            Params::new(Some(json!(["0x1111111111111111111111111111111111111111"])));
        let addr: Address = params.bind_required(0).unwrap();
        assert_eq!(addr, Address::repeat_byte(0x11));
    }

    #[test]
    fn required_rejects_missing() {
        let params = Params::new(None);
        assert!(params.bind_required::<Address>(0).is_err());
    }
}

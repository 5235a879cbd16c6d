use serde::{Deserialize, Serialize};

use super::error::Result;
use super::marshal::{Payload, TypeName};
use super::params::{Interface, Params};

pub type MethodName = String;

/// A single remote call.
///
/// `(method, param_types)` is the compound overload key: `number(i32)` and
/// `number(Option<i32>)` are different methods on the server.
///
/// There is no request identifier; a response is paired with its request
/// only by strict alternation on the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRequest {
    pub interface: String,
    pub method: MethodName,
    pub param_types: Vec<TypeName>,
    pub params: Vec<Payload>,
}

impl CallRequest {
    pub fn new(
        interface: impl Into<String>,
        method: impl Into<String>,
        param_types: Vec<TypeName>,
        params: Vec<Payload>,
    ) -> Self {
        CallRequest {
            interface: interface.into(),
            method: method.into(),
            param_types,
            params,
        }
    }

    /// Builds a request for `I::method` from a typed argument tuple.
    pub fn for_call<I, P>(method: impl Into<String>, params: P) -> Result<Self>
    where
        I: Interface + ?Sized,
        P: Params,
    {
        Ok(Self::new(
            I::ID,
            method,
            P::type_names(),
            params.into_payloads()?,
        ))
    }
}

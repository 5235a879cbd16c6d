//! Method tables and skeletons.
//!
//! A [`MethodTable`] maps `(method name, parameter type names)` to a typed
//! handler over the service trait object. Binding a table to an
//! implementation yields a [`Skeleton`], the erased form the registry and
//! dispatcher work with.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_common::{CallRequest, CallResult, Interface, Marshal, Params};
//! use tether_server::skeleton::{bind, MethodTable, ServiceInterface};
//!
//! pub trait Counter: Send + Sync {
//!     fn add(&self, n: i32) -> i32;
//! }
//!
//! impl Interface for dyn Counter {
//!     const ID: &'static str = "demo.Counter";
//! }
//!
//! impl ServiceInterface for dyn Counter {
//!     fn method_table() -> MethodTable<Self> {
//!         MethodTable::new(Self::ID).method("add", |s: &Self, (n,): (i32,)| s.add(n))
//!     }
//! }
//!
//! struct Plus10;
//! impl Counter for Plus10 {
//!     fn add(&self, n: i32) -> i32 { n + 10 }
//! }
//!
//! let target: Arc<dyn Counter> = Arc::new(Plus10);
//! let skeleton = bind(target);
//! let request = CallRequest::for_call::<dyn Counter, _>("add", (1i32,)).unwrap();
//! let result = skeleton.invoke(request).unwrap();
//! assert_eq!(result.into_value::<i32>().unwrap(), 11);
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tether_common::protocol::{
    CallRequest, CallResult, Interface, Marshal, Params, Payload, Result, TetherError, TypeName,
};

type Handler<S> = Arc<dyn Fn(&S, Vec<Payload>) -> Result<CallResult> + Send + Sync>;

/// Overload key: method name plus declared parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: String,
    pub param_types: Vec<TypeName>,
}

/// Typed handlers for one interface.
pub struct MethodTable<S: ?Sized> {
    interface: &'static str,
    methods: HashMap<MethodKey, Handler<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> MethodTable<S> {
    pub fn new(interface: &'static str) -> Self {
        Self {
            interface,
            methods: HashMap::new(),
        }
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Registers a value-returning method. A null result (`None`) is
    /// reported as `ExplicitNull`.
    pub fn method<P, R, F>(self, name: &str, f: F) -> Self
    where
        P: Params + 'static,
        R: Marshal + 'static,
        F: Fn(&S, P) -> R + Send + Sync + 'static,
    {
        self.insert::<P>(
            name,
            Arc::new(move |target: &S, payloads: Vec<Payload>| -> Result<CallResult> {
                let value = f(target, P::from_payloads(payloads)?);
                Ok(CallResult::returned(value.to_payload()?))
            }),
        )
    }

    /// Registers a void-declared method. It always yields `NoReturn`.
    pub fn procedure<P, F>(self, name: &str, f: F) -> Self
    where
        P: Params + 'static,
        F: Fn(&S, P) + Send + Sync + 'static,
    {
        self.insert::<P>(
            name,
            Arc::new(move |target: &S, payloads: Vec<Payload>| -> Result<CallResult> {
                f(target, P::from_payloads(payloads)?);
                Ok(CallResult::NoReturn)
            }),
        )
    }

    /// Registers a value-returning method that may fail. An `Err` is
    /// reported as `ServiceFailure`.
    pub fn fallible<P, R, E, F>(self, name: &str, f: F) -> Self
    where
        P: Params + 'static,
        R: Marshal + 'static,
        E: Display + 'static,
        F: Fn(&S, P) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        self.insert::<P>(
            name,
            Arc::new(move |target: &S, payloads: Vec<Payload>| -> Result<CallResult> {
                match f(target, P::from_payloads(payloads)?) {
                    Ok(value) => Ok(CallResult::returned(value.to_payload()?)),
                    Err(e) => Err(TetherError::ServiceFailure(e.to_string())),
                }
            }),
        )
    }

    /// Registers a void-declared method that may fail.
    pub fn fallible_procedure<P, E, F>(self, name: &str, f: F) -> Self
    where
        P: Params + 'static,
        E: Display + 'static,
        F: Fn(&S, P) -> std::result::Result<(), E> + Send + Sync + 'static,
    {
        self.insert::<P>(
            name,
            Arc::new(move |target: &S, payloads: Vec<Payload>| -> Result<CallResult> {
                f(target, P::from_payloads(payloads)?)
                    .map(|()| CallResult::NoReturn)
                    .map_err(|e| TetherError::ServiceFailure(e.to_string()))
            }),
        )
    }

    fn insert<P: Params>(mut self, name: &str, handler: Handler<S>) -> Self {
        let key = MethodKey {
            name: name.to_string(),
            param_types: P::type_names(),
        };
        match self.methods.entry(key) {
            Entry::Occupied(mut entry) => {
                tracing::warn!(
                    interface = self.interface,
                    method = name,
                    params = ?entry.key().param_types,
                    "Method registered twice, keeping the last handler"
                );
                entry.insert(handler);
            }
            Entry::Vacant(entry) => {
                entry.insert(handler);
            }
        }
        self
    }

    pub fn contains(&self, name: &str, param_types: &[TypeName]) -> bool {
        self.methods.contains_key(&MethodKey {
            name: name.to_string(),
            param_types: param_types.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Every registered overload key.
    pub fn signatures(&self) -> Vec<MethodKey> {
        self.methods.keys().cloned().collect()
    }

    /// Resolves the method by exact overload key and invokes it.
    ///
    /// A panic inside the handler is caught and reported as
    /// `ServiceFailure`.
    pub fn invoke(
        &self,
        target: &S,
        method: &str,
        param_types: &[TypeName],
        params: Vec<Payload>,
    ) -> Result<CallResult> {
        let key = MethodKey {
            name: method.to_string(),
            param_types: param_types.to_vec(),
        };
        let handler = self
            .methods
            .get(&key)
            .ok_or_else(|| TetherError::MethodNotFound {
                interface: self.interface.to_string(),
                method: method.to_string(),
                param_types: param_types.to_vec(),
            })?;

        match catch_unwind(AssertUnwindSafe(|| handler(target, params))) {
            Ok(result) => result,
            Err(panic) => Err(TetherError::ServiceFailure(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("service panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("service panicked: {}", message)
    } else {
        "service panicked".to_string()
    }
}

/// An interface whose calls can be served.
///
/// Implemented on the trait-object type alongside [`Interface`].
pub trait ServiceInterface: Interface {
    fn method_table() -> MethodTable<Self>;
}

/// A service implementation bound to its method table, with the types
/// erased.
pub trait Skeleton: Send + Sync {
    fn interface(&self) -> &'static str;

    fn invoke(&self, request: CallRequest) -> Result<CallResult>;
}

struct BoundSkeleton<I: ?Sized> {
    target: Arc<I>,
    table: MethodTable<I>,
}

impl<I: ?Sized + Send + Sync + 'static> Skeleton for BoundSkeleton<I> {
    fn interface(&self) -> &'static str {
        self.table.interface()
    }

    fn invoke(&self, request: CallRequest) -> Result<CallResult> {
        self.table.invoke(
            &*self.target,
            &request.method,
            &request.param_types,
            request.params,
        )
    }
}

/// Binds an implementation to its interface's method table.
pub fn bind<I: ServiceInterface + ?Sized>(target: Arc<I>) -> Arc<dyn Skeleton> {
    Arc::new(BoundSkeleton {
        target,
        table: I::method_table(),
    })
}

//! Tether Server
//!
//! This crate turns trait implementations into network services: method
//! tables stand in for runtime reflection, the registry groups
//! implementations by interface, the dispatcher resolves and invokes a
//! call, and [`RpcServer`] carries calls over TCP.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_common::{CallRequest, Interface};
//! use tether_server::{bind, Dispatcher, MethodTable, ServiceInterface, ServiceRegistry};
//!
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self, name: String) -> String;
//! }
//!
//! impl Interface for dyn Greeter {
//!     const ID: &'static str = "demo.Greeter";
//! }
//!
//! impl ServiceInterface for dyn Greeter {
//!     fn method_table() -> MethodTable<Self> {
//!         MethodTable::new(Self::ID).method("greet", |s: &Self, (name,): (String,)| s.greet(name))
//!     }
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self, name: String) -> String {
//!         format!("Hello, {}", name)
//!     }
//! }
//!
//! let registry = Arc::new(ServiceRegistry::default());
//! let target: Arc<dyn Greeter> = Arc::new(English);
//! registry.register("englishGreeter", 1, bind(target));
//!
//! let dispatcher = Dispatcher::new(registry);
//! let request = CallRequest::for_call::<dyn Greeter, _>("greet", ("Ada".to_string(),)).unwrap();
//! let greeting: String = dispatcher.dispatch(request).into_value().unwrap();
//! assert_eq!(greeting, "Hello, Ada");
//! ```

pub mod dispatcher;
pub mod load_balancer;
pub mod registry;
pub mod server;
pub mod skeleton;

pub use dispatcher::Dispatcher;
pub use load_balancer::WeightTable;
pub use registry::{SelectionPolicy, ServiceEntry, ServiceRegistry, DEFAULT_WEIGHT};
pub use server::{RpcServer, ShutdownHandle};
pub use skeleton::{bind, MethodKey, MethodTable, ServiceInterface, Skeleton};

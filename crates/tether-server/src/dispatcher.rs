use std::sync::Arc;

use tether_common::protocol::{CallRequest, CallResult, Result};
use tether_common::transport::MessageCodec;

use crate::registry::ServiceRegistry;

/// Routes decoded calls to service implementations.
///
/// Dispatching never fails: every per-call error (unknown interface,
/// ambiguous implementation, unknown overload, argument mismatch, service
/// failure) becomes a `CallResult::Error` and is logged here.
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Resolves the implementation and method, invokes it and builds the
    /// result.
    pub fn dispatch(&self, request: CallRequest) -> CallResult {
        let interface = request.interface.clone();
        let method = request.method.clone();
        tracing::debug!(interface = %interface, method = %method, "Dispatching call");

        match self.try_dispatch(request) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(interface = %interface, method = %method, error = %e, "Call failed");
                CallResult::fault(&e)
            }
        }
    }

    fn try_dispatch(&self, request: CallRequest) -> Result<CallResult> {
        let service = self.registry.resolve(&request.interface)?;
        tracing::trace!(service = %service.name, "Resolved implementation");
        service.skeleton.invoke(request)
    }

    /// Decodes a request payload and dispatches it. A payload that is not a
    /// valid request yields a `MalformedRequest` fault.
    pub fn dispatch_bytes(&self, payload: &[u8]) -> CallResult {
        match MessageCodec::decode_request(payload) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode request");
                CallResult::fault(&e)
            }
        }
    }

    /// Request payload in, encoded result payload out.
    pub fn handle_frame(&self, payload: &[u8]) -> Result<Vec<u8>> {
        MessageCodec::encode_result(&self.dispatch_bytes(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SelectionPolicy;
    use crate::skeleton::{bind, MethodTable, ServiceInterface};
    use tether_common::protocol::{FaultKind, Interface, TetherError};

    pub trait Echo: Send + Sync {
        fn echo(&self, text: String) -> String;
        fn nothing(&self) -> Option<String>;
        fn ping(&self);
    }

    impl Interface for dyn Echo {
        const ID: &'static str = "test.Echo";
    }

    impl ServiceInterface for dyn Echo {
        fn method_table() -> MethodTable<Self> {
            MethodTable::new(Self::ID)
                .method("echo", |s: &Self, (text,): (String,)| s.echo(text))
                .method("nothing", |s, (): ()| s.nothing())
                .procedure("ping", |s, (): ()| s.ping())
        }
    }

    struct Loud(&'static str);

    impl Echo for Loud {
        fn echo(&self, text: String) -> String {
            format!("{}{}", self.0, text)
        }

        fn nothing(&self) -> Option<String> {
            None
        }

        fn ping(&self) {}
    }

    fn dispatcher(policy: SelectionPolicy, prefixes: &[&'static str]) -> Dispatcher {
        let registry = Arc::new(ServiceRegistry::new(policy));
        for (i, prefix) in prefixes.iter().enumerate() {
            let target: Arc<dyn Echo> = Arc::new(Loud(*prefix));
            registry.register(format!("echo{}", i), 1, bind(target));
        }
        Dispatcher::new(registry)
    }

    fn fault_kind(result: CallResult) -> FaultKind {
        match result {
            CallResult::Error(fault) => fault.kind,
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_value() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[">"]);
        let request = CallRequest::for_call::<dyn Echo, _>("echo", ("hi".to_string(),)).unwrap();
        let result = dispatcher.dispatch(request);
        assert_eq!(result.into_value::<String>().unwrap(), ">hi");
    }

    #[test]
    fn test_void_and_null_are_distinct() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[">"]);

        let ping = CallRequest::for_call::<dyn Echo, _>("ping", ()).unwrap();
        assert_eq!(dispatcher.dispatch(ping), CallResult::NoReturn);

        let nothing = CallRequest::for_call::<dyn Echo, _>("nothing", ()).unwrap();
        assert_eq!(dispatcher.dispatch(nothing), CallResult::ExplicitNull);
    }

    #[test]
    fn test_unknown_interface() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[]);
        let request = CallRequest::for_call::<dyn Echo, _>("ping", ()).unwrap();
        assert_eq!(fault_kind(dispatcher.dispatch(request)), FaultKind::NoImplementationFound);
    }

    #[test]
    fn test_strict_policy_with_two_implementations() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &["a", "b"]);
        let request = CallRequest::for_call::<dyn Echo, _>("ping", ()).unwrap();
        assert_eq!(fault_kind(dispatcher.dispatch(request)), FaultKind::AmbiguousImplementation);
    }

    #[test]
    fn test_weighted_policy_with_two_implementations() {
        let dispatcher = dispatcher(SelectionPolicy::Weighted, &["a:", "b:"]);
        let mut outputs = Vec::new();
        for _ in 0..4 {
            let request =
                CallRequest::for_call::<dyn Echo, _>("echo", ("x".to_string(),)).unwrap();
            outputs.push(dispatcher.dispatch(request).into_value::<String>().unwrap());
        }
        outputs.sort();
        // Weight 1 each: two slots per name per cycle
        assert_eq!(outputs, vec!["a:x", "a:x", "b:x", "b:x"]);
    }

    #[test]
    fn test_unknown_method() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[">"]);
        let request = CallRequest::for_call::<dyn Echo, _>("echo", (1i32,)).unwrap();
        assert_eq!(fault_kind(dispatcher.dispatch(request)), FaultKind::MethodNotFound);
    }

    #[test]
    fn test_malformed_bytes() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[">"]);
        assert_eq!(
            fault_kind(dispatcher.dispatch_bytes(&[0xFF, 0xFF, 0xFF])),
            FaultKind::MalformedRequest
        );
    }

    #[test]
    fn test_handle_frame_round_trip() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[">"]);
        let request = CallRequest::for_call::<dyn Echo, _>("echo", ("yo".to_string(),)).unwrap();
        let reply = dispatcher
            .handle_frame(&MessageCodec::encode_request(&request).unwrap())
            .unwrap();

        let result = MessageCodec::decode_result(&reply).unwrap();
        assert_eq!(result.into_value::<String>().unwrap(), ">yo");
    }

    #[test]
    fn test_remote_fault_surfaces_as_error() {
        let dispatcher = dispatcher(SelectionPolicy::Strict, &[]);
        let request = CallRequest::for_call::<dyn Echo, _>("ping", ()).unwrap();
        let err = dispatcher.dispatch(request).into_unit().unwrap_err();
        assert!(matches!(
            err,
            TetherError::Remote { kind: FaultKind::NoImplementationFound, .. }
        ));
    }
}

use std::marker::PhantomData;
use std::sync::Arc;

use tether_common::protocol::{Interface, Marshal, Params, Result};

use crate::client::RpcClient;

/// An interface that can be called remotely through a local stand-in.
///
/// Implemented on the trait-object type, next to [`Interface`]. The
/// stand-in is a hand-written adapter that forwards each trait method
/// through a [`Stub`].
pub trait RemoteInterface: Interface {
    fn stand_in(client: RpcClient) -> Arc<Self>;
}

/// Creates the stand-in for `I` over `client`.
pub fn stand_in<I: RemoteInterface + ?Sized>(client: RpcClient) -> Arc<I> {
    I::stand_in(client)
}

/// Forwards calls for one interface over a shared client.
pub struct Stub<I: ?Sized> {
    client: RpcClient,
    _interface: PhantomData<fn() -> Box<I>>,
}

impl<I: Interface + ?Sized> Stub<I> {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client,
            _interface: PhantomData,
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn invoke<P: Params, R: Marshal>(&self, method: &str, params: P) -> Result<R> {
        self.client.invoke(I::ID, method, params)
    }

    pub fn invoke_void<P: Params>(&self, method: &str, params: P) -> Result<()> {
        self.client.invoke_void(I::ID, method, params)
    }
}

impl<I: ?Sized> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _interface: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_common::config::RpcConfig;
    use tether_common::protocol::TetherError;

    pub trait Clock: Send + Sync {
        fn now(&self) -> Result<i64>;
    }

    impl Interface for dyn Clock {
        const ID: &'static str = "test.Clock";
    }

    struct ClockProxy {
        stub: Stub<dyn Clock>,
    }

    impl Clock for ClockProxy {
        fn now(&self) -> Result<i64> {
            self.stub.invoke("now", ())
        }
    }

    impl RemoteInterface for dyn Clock {
        fn stand_in(client: RpcClient) -> Arc<Self> {
            Arc::new(ClockProxy {
                stub: Stub::new(client),
            })
        }
    }

    #[test]
    fn test_stand_in_forwards_through_client() {
        let client = RpcClient::new(RpcConfig::new()).unwrap();
        let clock: Arc<dyn Clock> = stand_in::<dyn Clock>(client);
        assert!(matches!(clock.now(), Err(TetherError::NoConnection)));
    }
}

use std::sync::Arc;

use tether_common::config::RpcConfig;
use tether_common::protocol::Result;

use crate::client_container::ClientContainer;
use crate::component::{Participants, Role};
use crate::container::Container;
use crate::server_container::ServerContainer;

/// A process assembled from its participants, on the side its entry
/// participant names.
pub enum Application {
    Client(ClientContainer),
    Server(ServerContainer),
}

impl Application {
    /// Picks the role from the entry participant, then builds and starts
    /// the matching container. A server starts serving in the background;
    /// call [`wait`](Self::wait) to block on it.
    pub fn run(participants: Participants, config: RpcConfig) -> Result<Self> {
        let role = participants.role()?;
        tracing::info!(?role, participants = participants.len(), "Starting application");

        let application = match role {
            Role::Client => Application::Client(ClientContainer::new(participants, config)),
            Role::Server => Application::Server(ServerContainer::new(participants, config)),
        };
        match &application {
            Application::Client(container) => container.init()?,
            Application::Server(container) => container.init()?,
        }
        Ok(application)
    }

    pub fn role(&self) -> Role {
        match self {
            Application::Client(_) => Role::Client,
            Application::Server(_) => Role::Server,
        }
    }

    pub fn container(&self) -> Result<Arc<Container>> {
        match self {
            Application::Client(container) => container.container(),
            Application::Server(container) => container.container(),
        }
    }

    /// Blocks until a server stops; returns at once for a client.
    pub fn wait(&self) -> Result<()> {
        match self {
            Application::Client(_) => Ok(()),
            Application::Server(container) => container.wait(),
        }
    }

    /// Stops the worker pool and the transport of either side.
    pub fn close(&self) {
        match self {
            Application::Client(container) => container.teardown(),
            Application::Server(container) => container.teardown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Descriptor, Participant};
    use tether_common::protocol::TetherError;

    #[derive(Default)]
    struct Helper;

    impl Participant for Helper {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new()
        }
    }

    #[derive(Default)]
    struct ServerMain;

    impl Participant for ServerMain {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new().server_entry()
        }
    }

    #[derive(Default)]
    struct ClientMain;

    impl Participant for ClientMain {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new().client_entry()
        }
    }

    #[test]
    fn test_no_entry_point() {
        let result = Application::run(Participants::new().with::<Helper>(), RpcConfig::new());
        assert!(matches!(result, Err(TetherError::NoEntryPoint)));
    }

    #[test]
    fn test_conflicting_entry_points() {
        let participants = Participants::new().with::<ServerMain>().with::<ClientMain>();
        let result = Application::run(participants, RpcConfig::new());
        assert!(matches!(result, Err(TetherError::InvalidConfig(_))));
    }

    #[test]
    fn test_server_role() {
        let participants = Participants::new().with::<ServerMain>().with::<Helper>();
        let application = Application::run(participants, RpcConfig::new().with_port(0)).unwrap();
        assert_eq!(application.role(), Role::Server);

        let container = application.container().unwrap();
        assert!(container.get_by_type::<ServerMain>().unwrap().is_some());
        assert!(container.component("serviceRegistry").is_some());

        application.close();
        application.wait().unwrap_err();
    }
}

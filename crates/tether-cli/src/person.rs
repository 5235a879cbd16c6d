//! The demo person directory: a name-keyed in-memory collection exposed
//! as a remote service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tether_client::{RemoteInterface, RpcClient, Stub};
use tether_common::config::RpcConfig;
use tether_common::protocol::{Interface, Result};
use tether_container::{Autowired, Descriptor, Participant};
use tether_server::{MethodTable, ServiceInterface};

/// Accepted values for [`Person::sex`].
pub const SEXES: [&str; 2] = ["male", "female"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub sex: String,
    pub age: i32,
}

tether_common::document_value!(Person);

/// Remote person directory.
///
/// Both `number` forms travel under the same method name; the server
/// tells them apart by their parameter types.
pub trait PersonService: Send + Sync {
    /// Stores a person. Empty names and unknown sexes are ignored.
    fn add(&self, name: String, sex: String, age: i32) -> Result<()>;
    fn get(&self, name: String) -> Result<Option<Person>>;
    fn remove(&self, name: String) -> Result<Option<Person>>;
    fn count(&self) -> Result<i32>;
    /// Echoes `n`.
    fn number(&self, n: i32) -> Result<i32>;
    /// `n + 10`, or `-1` for null.
    fn number_or_null(&self, n: Option<i32>) -> Result<i32>;
}

impl Interface for dyn PersonService {
    const ID: &'static str = "demo.PersonService";
}

impl ServiceInterface for dyn PersonService {
    fn method_table() -> MethodTable<Self> {
        MethodTable::new(Self::ID)
            .fallible_procedure("add", |s: &Self, (name, sex, age): (String, String, i32)| {
                s.add(name, sex, age)
            })
            .fallible("get", |s, (name,): (String,)| s.get(name))
            .fallible("remove", |s, (name,): (String,)| s.remove(name))
            .fallible("count", |s, (): ()| s.count())
            .fallible("number", |s, (n,): (i32,)| s.number(n))
            .fallible("number", |s, (n,): (Option<i32>,)| s.number_or_null(n))
    }
}

impl RemoteInterface for dyn PersonService {
    fn stand_in(client: RpcClient) -> Arc<Self> {
        Arc::new(PersonServiceProxy {
            stub: Stub::new(client),
        })
    }
}

/// Server-side directory over a locked map.
#[derive(Default)]
pub struct PersonServiceImpl {
    people: Mutex<HashMap<String, Person>>,
}

impl PersonServiceImpl {
    fn people(&self) -> std::sync::MutexGuard<'_, HashMap<String, Person>> {
        self.people.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersonService for PersonServiceImpl {
    fn add(&self, name: String, sex: String, age: i32) -> Result<()> {
        if name.is_empty() || !SEXES.contains(&sex.as_str()) {
            tracing::debug!(%name, %sex, "Ignoring person");
            return Ok(());
        }
        self.people().insert(name.clone(), Person { name, sex, age });
        Ok(())
    }

    fn get(&self, name: String) -> Result<Option<Person>> {
        Ok(self.people().get(&name).cloned())
    }

    fn remove(&self, name: String) -> Result<Option<Person>> {
        Ok(self.people().remove(&name))
    }

    fn count(&self) -> Result<i32> {
        Ok(i32::try_from(self.people().len()).unwrap_or(i32::MAX))
    }

    fn number(&self, n: i32) -> Result<i32> {
        Ok(n)
    }

    fn number_or_null(&self, n: Option<i32>) -> Result<i32> {
        Ok(n.map_or(-1, |n| n.wrapping_add(10)))
    }
}

impl Participant for PersonServiceImpl {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::<Self>::new().service::<dyn PersonService>(|s| s)
    }
}

/// Client-side stand-in for [`PersonService`].
pub struct PersonServiceProxy {
    stub: Stub<dyn PersonService>,
}

impl PersonService for PersonServiceProxy {
    fn add(&self, name: String, sex: String, age: i32) -> Result<()> {
        self.stub.invoke_void("add", (name, sex, age))
    }

    fn get(&self, name: String) -> Result<Option<Person>> {
        self.stub.invoke("get", (name,))
    }

    fn remove(&self, name: String) -> Result<Option<Person>> {
        self.stub.invoke("remove", (name,))
    }

    fn count(&self) -> Result<i32> {
        self.stub.invoke("count", ())
    }

    fn number(&self, n: i32) -> Result<i32> {
        self.stub.invoke("number", (n,))
    }

    fn number_or_null(&self, n: Option<i32>) -> Result<i32> {
        self.stub.invoke("number", (n,))
    }
}

/// Entry participant of the person server process.
#[derive(Default)]
pub struct PersonServer {
    config: Autowired<RpcConfig>,
}

impl PersonServer {
    pub fn config(&self) -> Result<Arc<RpcConfig>> {
        self.config.get()
    }
}

impl Participant for PersonServer {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::<Self>::new()
            .server_entry()
            .autowired_named("config", "rpcConfig", |s| &s.config)
    }
}

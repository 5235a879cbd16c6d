pub mod error;
pub mod marshal;
pub mod params;
pub mod requests;
pub mod responses;


pub use error::{Result, TetherError};
pub use marshal::{deserialize, serialize, Marshal, Native, Payload, TypeName};
pub use params::{Interface, Params};
pub use requests::{CallRequest, MethodName};
pub use responses::{CallResult, FaultKind, RemoteFault};

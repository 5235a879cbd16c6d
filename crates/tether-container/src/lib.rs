//! Tether Container
//!
//! A small wiring container. Participant types describe themselves with a
//! [`Descriptor`]; the container instantiates each one once, names it,
//! fills its [`Autowired`] slots (by name, then by unique type) and, on the
//! client side, its [`Reference`] slots with remote stand-ins.
//!
//! [`Application::run`] picks the client or server side from the entry
//! participant and starts the matching container.

pub mod application;
pub mod client_container;
pub mod component;
pub mod container;
pub mod server_container;

pub use application::Application;
pub use client_container::ClientContainer;
pub use component::{Autowired, Descriptor, Participant, Participants, Reference, Role};
pub use container::{Component, Container};
pub use server_container::ServerContainer;

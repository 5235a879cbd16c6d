// Copyright 2025 Tether Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Tether CLI
//!
//! The demo application behind the `tether` binary.
//!
//! - **Person service**: a name-keyed directory served by `tether server`
//! - **Customer**: a load driver run by `tether client` that calls the
//!   directory from many pool workers over one shared connection
//!
//! ## Key Commands
//!
//! - `tether server [--config FILE]`: serve the person directory
//! - `tether client [--config FILE] [--times N]`: run N call rounds
//!
//! Both sides read the same properties file (`address`, `port`, ...), so
//! one file points a client at its server.

pub mod customer;
pub mod person;

use tether_container::Participants;

pub use customer::{Customer, Report, DEFAULT_TIMES};
pub use person::{Person, PersonServer, PersonService, PersonServiceImpl, PersonServiceProxy};

/// Participants of the `tether server` process.
pub fn server_participants() -> Participants {
    Participants::new()
        .with::<PersonServer>()
        .with::<PersonServiceImpl>()
}

/// Participants of the `tether client` process.
pub fn client_participants() -> Participants {
    Participants::new().with::<Customer>()
}

//! GraphQL data layer of the Edgehog console.
//!
//! Requests are encoded by [`services::HttpTransport`] (JSON, or multipart
//! when [`uploads::extract`] finds files in the variables), responses are
//! published into a normalized [`store::Store`], and mutation handlers keep
//! cached lists consistent by returning [`store::StorePatch`]es.

#![warn(unreachable_pub)]

pub mod configuration;
pub mod environment;
pub mod error;
mod executable;
pub mod graphql;
pub mod json_ext;
pub mod refresh;
pub mod services;
pub mod store;
pub mod uploads;

pub use configuration::Configuration;
pub use environment::Environment;
pub use executable::main;
pub use services::HttpTransport;
pub use store::Store;

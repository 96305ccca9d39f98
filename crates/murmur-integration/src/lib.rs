#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod capability;
pub mod connection;
pub mod definition;
pub mod event;
pub mod hook;
mod hub;
pub mod inbound;
pub mod oauth;
pub mod providers;
pub mod registry;
pub mod store;
pub mod sync;

pub use hub::{HubStores, IntegrationHub};
pub use murmur_core::{Error, ErrorKind, Result};

pub use crate::connection::{ConfigMap, ConnectionStatus, IntegrationConnection, SecretMap};
pub use crate::definition::{IntegrationDefinition, IntegrationType};
pub use crate::event::DomainEvent;
pub use crate::registry::{CatalogEntry, IntegrationRegistry};

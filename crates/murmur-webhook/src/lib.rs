#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod inbound;
pub mod outcome;
pub mod reqwest;
pub mod signature;

pub use inbound::{InboundRequest, InboundResponse};
pub use murmur_core::{Error, ErrorKind, Result};
pub use outcome::{HookResult, is_retryable_error, is_retryable_status};
pub use signature::{SignatureError, SignatureScheme};

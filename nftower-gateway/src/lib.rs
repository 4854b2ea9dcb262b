//! Everything the provisioner talks to: the Tower REST API and the AWS
//! stack-output and secret stores.
//!
//! The reconciler only sees the [`Gateway`], [`StackOutputs`] and
//! [`SecretStore`] traits; [`TowerClient`] and [`AwsCli`] are the production
//! implementations and the `mock` module (feature `test-helpers`) provides
//! in-memory ones.

pub mod aws;
pub mod client;
pub mod endpoint;
pub mod gateway;
pub mod outcome;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use aws::{require_output, AwsCli, OutputMap, SecretStore, StackOutputs};
pub use client::{token_from_env, TowerClient, ENDPOINT_ENV, TOKEN_ENV};
pub use endpoint::{resolve_api_endpoint, EndpointSource};
pub use gateway::{Gateway, Method, Pages, Query, DEFAULT_PAGE_SIZE};
pub use outcome::{extract_quoted, response_message, Deletion, Outcome};

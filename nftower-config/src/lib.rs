//! Desired state for the Tower provisioner.
//!
//! Project descriptors are discovered under a configuration directory,
//! validated, and turned into [`Project`]s carrying their [`Users`] and
//! [`Tags`]. [`Settings`] holds every deployment constant the reconciler needs.

pub mod descriptor;
pub mod identity;
pub mod loader;
pub mod project;
pub mod settings;
pub mod tags;
pub mod users;

pub use identity::{extract_identities, extract_identity, ArnPolicy};
pub use loader::DescriptorLoader;
pub use project::{Project, Projects};
pub use settings::Settings;
pub use tags::{derive_tags, Tags};
pub use users::{Bucket, Role, Users};

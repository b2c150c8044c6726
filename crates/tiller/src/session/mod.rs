//! Session registry and lifecycle.

mod models;
mod registry;

pub use models::{Session, SessionRecord};
pub use registry::{RegistryError, SessionRegistry};

// ABOUTME: Validated domain types shared across modules.
// ABOUTME: Environments, versions, service names and image references.

mod environment;
mod image_ref;
mod service_name;
mod version;

pub use environment::{Environment, UnknownEnvironment};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use service_name::{ServiceName, ServiceNameError};
pub use version::{IncrementKind, Version, VersionError};

//! Version model and version constraints.

pub mod number;
pub mod range;

pub use number::{VERSION_SECTION_SEPARATOR, Version};
pub use range::VersionRange;

//! Job descriptors: what to run, and where
//!
//! - `descriptor` - raw requests and their validated form
//! - `zone` - zone names parsed into region + suffix

pub mod descriptor;
pub mod zone;

pub use descriptor::{JobDescriptor, JobRequest, DEFAULT_MACHINE_PREFIX};
pub use zone::Zone;

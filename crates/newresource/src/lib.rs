//! Top-level facade crate for the newresource controller.
//!
//! Re-exports core types and the controller library so users can depend on a single crate.

pub mod core {
    pub use newresource_core::*;
}

pub mod controller {
    pub use newresource_controller::*;
}

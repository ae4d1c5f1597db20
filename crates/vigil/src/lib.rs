//! Top-level facade crate for vigil.
//!
//! Re-exports the metric model, the storage backends, the collector service
//! and the reporting agent so users can depend on a single crate.

pub mod core {
    pub use vigil_core::*;
}

pub mod store {
    pub use vigil_store::*;
}

pub mod collector {
    pub use vigil_collector::*;
}

pub mod agent {
    pub use vigil_agent::*;
}

//! Testing utilities for Larder.
//!
//! - [`fakes`]: call-counting fakes of the git and archive transports
//! - [`fixtures`]: package fixtures and tarball builders
//! - [`project`]: temporary projects wired to the fakes
//!
//! # Example
//!
//! ```rust,no_run
//! use larder_test_utils::prelude::*;
//!
//! let project = TempProject::new();
//! project
//!     .index
//!     .publish("https://index.example", PackageFixture::new("nginx", "1.0.0"));
//! let locations = project.locations();
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod fakes;
pub mod fixtures;
pub mod project;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Re-export commonly used testing utilities.
pub mod prelude {
    pub use crate::fakes::{FakeGit, FakeIndex};
    pub use crate::fixtures::{PackageFixture, tarball};
    pub use crate::init_tracing;
    pub use crate::project::{TEST_FETCH_TIMEOUT, TempProject};
}

//! Session integration tests
//!
//! These drive [`ferry::SessionManager`] end to end over in-memory fakes of
//! the file subsystem, the command runner and the pty channel, so they run
//! without a network or an SSH server.
//!
//! ```bash
//! cargo test --test session_integration
//! ```

pub mod fixtures;

mod config_tests;
mod exec_tests;
mod lifecycle_tests;

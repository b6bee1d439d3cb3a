//! Test utilities for the Session Controller.
//!
//! Provides mock collaborators with failure injection:
//!
//! - [`MockMediaEngine`] - media engine that can fail specific close
//!   calls and records every close attempt
//! - [`MockSessionStore`] - session store that can fail deletes and
//!   updates on demand

pub mod mock_media;
pub mod mock_store;

pub use mock_media::MockMediaEngine;
pub use mock_store::MockSessionStore;

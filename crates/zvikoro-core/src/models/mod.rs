//! Data models for the district administration API.
//!
//! The core treats the user profile as opaque: it is stored and replaced
//! wholesale from server responses. Accessors exist only for display.

pub mod announcement;
pub mod profile;

pub use announcement::Announcement;
pub use profile::{Profile, RegistrationForm};

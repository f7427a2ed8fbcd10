//! Credential models, self-describing token decoding, and scope sets.

pub mod claims;
pub mod credential;
pub mod scope;

pub use claims::*;
pub use credential::*;
pub use scope::*;

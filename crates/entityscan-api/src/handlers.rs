//! Request handlers.

pub mod frames;
pub mod health;
pub mod jobs;
pub mod reports;
pub mod search;

pub use frames::*;
pub use health::*;
pub use jobs::*;
pub use reports::*;
pub use search::*;

//! Hooks the request-handling side of the blog calls into.

pub mod view_counter;

pub use view_counter::ViewCounter;

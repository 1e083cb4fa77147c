//! Durable entities touched by the background jobs.
//!
//! Only the columns the write-back jobs read or write are modelled here;
//! the rest of each row belongs to the CRUD handlers.

pub mod link;
pub mod post;

pub use link::{Link, LinkOverview, LinkStatus};
pub use post::Post;

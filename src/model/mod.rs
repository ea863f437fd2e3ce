//! Data model for the crawler
//!
//! - `Task`: one site's crawl job over an ID range
//! - `Profile`: the transient result of crawling one ID
//! - `layout`: the ID to path mapping shared by the crawler and the archiver

pub mod layout;
mod profile;
mod task;

pub use layout::StorageLayout;
pub use profile::Profile;
pub use task::{IdRange, Site, Task};

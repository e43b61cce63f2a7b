mod database {
    pub mod actions;
    pub mod associations;
    pub mod connection;
    pub mod constraint;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod concurrency {
    pub mod etag;
    pub mod precondition;
}
mod api {
    pub mod filters;
    pub mod handlers;
    pub mod reply;
}
mod config;
mod constants;

pub use api::*;
pub use concurrency::*;
pub use config::*;
pub use constants::*;
pub use database::*;

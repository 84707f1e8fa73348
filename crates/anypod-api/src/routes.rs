//! Route handlers

mod admin;
mod health;
mod static_files;

pub use admin::{
    delete_download, get_download_fields, refresh_feed, reset_errors, submit_manual_download,
};
pub use health::health;
pub use static_files::{serve_feed, serve_image, serve_media};

//! Small pure helpers shared across the workspace

mod ident;
mod time;
mod urls;

pub use ident::is_valid_feed_id;
pub use time::{day_floor, format_itunes_duration};
pub use urls::normalize_submission_url;

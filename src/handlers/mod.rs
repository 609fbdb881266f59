mod health;
pub mod messages;
mod util;

pub use health::{health_check, root};
pub use messages::{send_template, send_text};
pub use util::AppJson;

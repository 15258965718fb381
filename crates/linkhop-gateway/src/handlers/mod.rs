mod health;
mod url;
mod user;

pub use health::ping_handler;
pub use self::url::{create_text_handler, redirect_handler, shorten_batch_handler, shorten_handler};
pub use user::{delete_user_urls_handler, list_user_urls_handler};

pub mod api;
pub mod session;
pub mod store;
pub mod transport;

pub use api::ApiClient;
pub use arrosage_common as common;
pub use session::Session;
pub use store::{apply_env_overrides, AppStore, TokenStore};
pub use transport::Transport;

pub mod live;
pub mod socketio;
pub mod utils;

// Re-export common items
pub use live::{run_live, LiveRunView, Session};
pub use utils::config::Config;

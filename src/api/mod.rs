// API module
//
// HTTP surface of a single ledger node

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::NodeState;
pub use routes::configure_routes;

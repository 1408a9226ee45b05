// API module
//
// REST front end over the ledger: chain and pending views, transaction
// submission, mining, validation and wallets

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;

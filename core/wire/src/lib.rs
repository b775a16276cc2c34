pub mod identifiers;
pub mod rpc_types;
pub mod solidity_types;

// Re-export identifier types for easier access
pub use identifiers::{Handle, IdentifierError, HANDLE_LENGTH};

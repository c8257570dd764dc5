// Decode stage, convert stage, and the shared pieces both rely on.
pub mod batch;
pub mod definition;
pub mod error;
pub mod identity;
pub mod mapping;
pub mod paths;
pub mod payload;
pub mod retry;
pub mod template;
pub mod workspace;

pub mod access;
pub mod context;
pub mod disclosure;
pub mod error;
pub mod exchange;
pub mod intent;
pub mod prompt;
pub mod request;
pub mod sanitize;

pub mod error;
pub mod job;
pub mod narrator;
pub mod settings;
pub mod types;
pub mod validator;

#[cfg(test)]
mod serde_tests;

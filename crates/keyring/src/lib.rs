pub mod algorithm;
pub mod error;
pub mod jwk_generator;
pub mod logic;
pub mod repository;
pub mod service;
pub mod types;

#[cfg(any(test, feature = "integration_test"))]
pub mod test;

//! Helpers for integration tests: a throwaway migrated database and seeded merchants.
pub mod prepare_env;
pub mod seed;

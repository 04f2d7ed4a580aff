//! Test fixtures for the token engine
//!
//! Deterministic key-service builders and token-tampering helpers used
//! by the integration suites. Everything here is reproducible: the same
//! inputs always produce the same secrets and the same corruptions.

pub mod fixtures;
pub mod tamper;

pub use fixtures::{
    hs256_vars, rsa_material, rsa_verify_only_material, seeded_key_service, sign_hs256,
    test_secret, FixtureError, TEST_RSA_PRIVATE_PEM, TEST_RSA_PUBLIC_PEM,
};
pub use tamper::{corrupt_segment, decode_segment_json};

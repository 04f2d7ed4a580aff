//! End-to-end key rotation scenarios
//!
//! Every test drives the public API the way the backend does: seed a
//! `KeyService` through configuration, issue with `TokenIssuer`, verify
//! with `TokenVerifier`, and control the clock through the `*_at`
//! variants.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use auth_core::{AuthError, KeyMaterial, KeyService, TokenIssuer, TokenType, TokenVerifier};
use auth_test_utils::{seeded_key_service, test_secret};
use chrono::{Duration, Utc};
use jsonwebtoken::Algorithm;
use serde_json::Map;

fn material(seed: u8) -> KeyMaterial {
    KeyMaterial::hmac(test_secret(seed).as_bytes())
}

#[test]
fn issued_token_round_trips() -> Result<()> {
    let keys = seeded_key_service(&[("2024-01", 1)], "2024-01")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys);
    let now = Utc::now();

    let token = issuer.create_access_token_at("user-42", Map::new(), None, now)?;
    let claims = verifier.decode_at(&token, now)?;

    assert_eq!(claims.sub, "user-42");
    assert_eq!(claims.token_type, Some(TokenType::Access));
    assert_eq!(claims.iat, Some(now.timestamp()));
    assert!(claims.exp > now.timestamp());
    assert!(!claims.jti.is_empty());
    Ok(())
}

#[test]
fn old_tokens_survive_rotation_until_the_grace_deadline() -> Result<()> {
    let keys = seeded_key_service(&[("old", 1)], "old")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    // Arrange: a token under the old key, then rotate with a 300 s grace.
    let old_token = issuer.create_access_token_at("user-1", Map::new(), None, t0)?;
    keys.rotate_at("new", material(2), Algorithm::HS256, Duration::seconds(300), t0)?;

    // Trusted through the deadline itself.
    assert!(verifier.decode_at(&old_token, t0).is_ok());
    assert!(verifier
        .decode_at(&old_token, t0 + Duration::seconds(300))
        .is_ok());

    // One second past it, rejected by retirement, not by signature.
    let err = verifier
        .decode_at(&old_token, t0 + Duration::seconds(301))
        .unwrap_err();
    assert!(matches!(err, AuthError::RetiredKey(kid) if kid == "old"));
    Ok(())
}

#[test]
fn new_key_is_trusted_immediately_after_rotation() -> Result<()> {
    let keys = seeded_key_service(&[("old", 1)], "old")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    keys.rotate_at("new", material(2), Algorithm::HS256, Duration::seconds(300), t0)?;
    let new_token = issuer.create_access_token_at("user-1", Map::new(), None, t0)?;

    // No warm-up window: issued and verified at the rotation instant.
    let claims = verifier.decode_at(&new_token, t0)?;
    assert_eq!(claims.sub, "user-1");

    // And still valid long after the old key's grace ran out.
    assert!(verifier
        .decode_at(&new_token, t0 + Duration::seconds(600))
        .is_ok());
    Ok(())
}

#[test]
fn rotating_to_the_same_kid_is_a_retirement_no_op() -> Result<()> {
    let keys = seeded_key_service(&[("only", 1)], "only")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    let token = issuer.create_access_token_at("user-1", Map::new(), None, t0)?;
    keys.rotate_at("only", material(1), Algorithm::HS256, Duration::seconds(1), t0)?;

    // The active key never distrusts itself, so no grace clock started.
    assert!(keys.retirement_deadline("only").is_none());
    assert!(verifier
        .decode_at(&token, t0 + Duration::seconds(120))
        .is_ok());
    Ok(())
}

#[test]
fn chained_rotations_retire_each_previous_key() -> Result<()> {
    let keys = seeded_key_service(&[("a", 1)], "a")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    let token_a = issuer.create_access_token_at("u", Map::new(), None, t0)?;
    keys.rotate_at("b", material(2), Algorithm::HS256, Duration::seconds(100), t0)?;
    let token_b = issuer.create_access_token_at("u", Map::new(), None, t0)?;
    keys.rotate_at("c", material(3), Algorithm::HS256, Duration::seconds(200), t0)?;

    // Each key runs on its own grace clock.
    assert!(verifier.decode_at(&token_a, t0 + Duration::seconds(100)).is_ok());
    assert!(matches!(
        verifier.decode_at(&token_a, t0 + Duration::seconds(101)),
        Err(AuthError::RetiredKey(_))
    ));
    assert!(verifier.decode_at(&token_b, t0 + Duration::seconds(200)).is_ok());
    assert!(matches!(
        verifier.decode_at(&token_b, t0 + Duration::seconds(201)),
        Err(AuthError::RetiredKey(_))
    ));
    Ok(())
}

#[test]
fn rotating_back_to_an_old_kid_restores_full_trust() -> Result<()> {
    let keys = seeded_key_service(&[("a", 1)], "a")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    // a -> b -> a: the return to active duty must erase a's grace
    // deadline, or fresh tokens under the active key die with it.
    keys.rotate_at("b", material(2), Algorithm::HS256, Duration::seconds(60), t0)?;
    keys.rotate_at("a", material(1), Algorithm::HS256, Duration::seconds(60), t0)?;

    let token = issuer.create_access_token_at("user-1", Map::new(), None, t0)?;
    let claims = verifier.decode_at(&token, t0 + Duration::seconds(120))?;
    assert_eq!(claims.sub, "user-1");

    // "b" was displaced and runs out on schedule.
    assert!(keys.retirement_deadline("a").is_none());
    assert_eq!(keys.retirement_deadline("b"), Some(t0 + Duration::seconds(60)));
    Ok(())
}

#[test]
fn displaced_key_still_expires_after_a_round_trip_rotation() -> Result<()> {
    let keys = seeded_key_service(&[("a", 1)], "a")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    keys.rotate_at("b", material(2), Algorithm::HS256, Duration::seconds(60), t0)?;
    let token_b = issuer.create_access_token_at("user-1", Map::new(), None, t0)?;
    keys.rotate_at("a", material(1), Algorithm::HS256, Duration::seconds(60), t0)?;

    // Reinstating "a" does not pardon "b".
    assert!(verifier
        .decode_at(&token_b, t0 + Duration::seconds(60))
        .is_ok());
    assert!(matches!(
        verifier.decode_at(&token_b, t0 + Duration::seconds(61)),
        Err(AuthError::RetiredKey(kid)) if kid == "b"
    ));
    Ok(())
}

#[test]
fn pruned_retirement_entries_fall_back_to_signature_trust() -> Result<()> {
    let keys = seeded_key_service(&[("old", 1)], "old")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());
    let t0 = Utc::now();

    let old_token = issuer.create_access_token_at("u", Map::new(), None, t0)?;
    keys.rotate_at("new", material(2), Algorithm::HS256, Duration::seconds(60), t0)?;

    let after = t0 + Duration::seconds(61);
    assert!(matches!(
        verifier.decode_at(&old_token, after),
        Err(AuthError::RetiredKey(_))
    ));

    // Pruning forgets the retirement; the kid is unknown again and the
    // key still sits in the store, so the signature decides.
    assert_eq!(keys.prune_retired_at(after), 1);
    assert!(verifier.decode_at(&old_token, after).is_ok());
    Ok(())
}

#[test]
fn dangling_active_kid_is_fatal_at_issuance_not_at_load() -> Result<()> {
    let keys = seeded_key_service(&[("x", 1)], "missing")?;
    let issuer = TokenIssuer::new(keys);

    let err = issuer.create_access_token("user-1").unwrap_err();
    assert!(matches!(err, AuthError::MisconfiguredActiveKey));
    assert!(err.is_misconfiguration());
    Ok(())
}

#[test]
fn rotation_is_visible_through_every_clone_of_the_handle() -> Result<()> {
    let keys = seeded_key_service(&[("a", 1)], "a")?;
    let clone = keys.clone();

    keys.rotate("b", material(2), Algorithm::HS256)?;

    assert_eq!(clone.active_kid().as_deref(), Some("b"));
    Ok(())
}

#[test]
fn verification_never_breaks_across_concurrent_rotations() -> Result<()> {
    let keys = seeded_key_service(&[("seed", 1)], "seed")?;
    let issuer = TokenIssuer::new(keys.clone());
    let verifier = TokenVerifier::new(keys.clone());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let issuer = issuer.clone();
            let verifier = verifier.clone();
            scope.spawn(move || {
                for i in 0..200 {
                    let token = issuer
                        .create_access_token(&format!("user-{i}"))
                        .expect("issuance under rotation");
                    verifier.decode(&token).expect("fresh token must verify");
                }
            });
        }

        // Rotate under the readers; the default one-hour grace keeps
        // every key issued during the test trusted.
        for round in 0..10 {
            keys.rotate(&format!("round-{round}"), material(round as u8 + 10), Algorithm::HS256)
                .expect("rotation");
        }
    });
    Ok(())
}

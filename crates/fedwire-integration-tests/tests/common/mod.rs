//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use fedwire_core::{
    Comment, EngineConfig, Entity, EntityId, EntityKind, ExtensionBag, FixedClock, Handle, KeyId, Post, TargetRef,
    Timestamp,
};
use fedwire_dispatch::Federation;
use fedwire_envelope::{SenderKey, StaticKeyResolver};

/// Fixed "now" for every test.
pub const NOW: i64 = 1_767_225_600;

/// Install a test subscriber once per binary; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ts(secs: i64) -> Result<Timestamp> {
    Ok(Timestamp::from_epoch_secs(secs)?)
}

pub fn federation() -> Result<Federation<FixedClock>> {
    federation_with(EngineConfig::default())
}

pub fn federation_with(config: EngineConfig) -> Result<Federation<FixedClock>> {
    init_tracing();
    Ok(Federation::with_clock(config, FixedClock(ts(NOW)?))?)
}

/// Deterministic signing key for `account`.
pub fn key(account: &str, seed: u8) -> Result<SenderKey> {
    Ok(SenderKey::from_seed_bytes(KeyId::new(account)?, &[seed; 32])?)
}

pub fn resolver(keys: &[&SenderKey]) -> StaticKeyResolver {
    keys.iter().map(|k| (k.key_id().clone(), k.verifying_key())).collect()
}

pub fn post(id: &str, author: &str) -> Result<Entity> {
    Ok(Entity::Post(Post::new(
        EntityId::new(id)?,
        Handle::new(author)?,
        ts(NOW - 120)?,
        "hello #fediverse",
    )))
}

pub fn comment(id: &str, author: &str, target: TargetRef) -> Result<Entity> {
    Ok(Entity::Comment(Comment {
        id: EntityId::new(id)?,
        author: Handle::new(author)?,
        created_at: ts(NOW - 60)?,
        target,
        text: "nice post".into(),
        extensions: ExtensionBag::new(),
    }))
}

pub fn comment_on_post(author: &str) -> Result<Entity> {
    comment("c1", author, TargetRef::new("p1", EntityKind::Post))
}

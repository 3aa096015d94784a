//! Browser User-Agent pool for upstream HTTP traffic.
//!
//! The pool holds realistic desktop browser strings. Selection is seeded by the
//! target origin so a given site sees the same User-Agent for the whole life of
//! the process instead of a different one on every request.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Realistic desktop Chrome User-Agents used for plain HTTP requests.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

/// Default User-Agent for the headless browser context.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Picks a User-Agent from [`USER_AGENTS`].
///
/// With a seed the choice is the first byte of `sha256(seed)` modulo the pool
/// size, so it is stable across calls and processes. Without a seed a random
/// entry is returned.
#[must_use]
pub fn pick_user_agent(seed: Option<&str>) -> &'static str {
    let index = match seed {
        Some(seed) => {
            let digest = Sha256::digest(seed.as_bytes());
            usize::from(digest[0]) % USER_AGENTS.len()
        }
        None => rand::thread_rng().gen_range(0..USER_AGENTS.len()),
    };
    USER_AGENTS[index]
}

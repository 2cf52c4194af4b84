//! API key generation

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// 生成的 key 长度
pub const API_KEY_LENGTH: usize = 48;

/// API key generator
pub struct ApiKeyGenerator;

impl ApiKeyGenerator {
    /// Generate a new opaque API key (48 alphanumeric chars from a CSPRNG)
    pub fn generate() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(API_KEY_LENGTH)
            .map(char::from)
            .collect()
    }
}

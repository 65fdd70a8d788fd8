//! Configuration read from the key store.
//!
//! Values live in the `config` table so the account setup code, the
//! encrypt pipeline and the decrypt pipeline all see the same settings.

use crate::error::Result;
use crate::peerstate::PreferEncrypted;
use crate::storage::KeyStoreGuard;

/// Configuration keys
pub mod keys {
    /// `1` enables end-to-end encryption, `0` disables it
    pub const E2EE_ENABLED: &str = "e2ee_enabled";

    /// Own e-mail address; keys are generated and looked up for it
    pub const CONFIGURED_ADDR: &str = "configured_addr";

    /// `1` advertises `prefer-encrypted=mutual` in outgoing headers
    pub const E2EE_PREFER_MUTUAL: &str = "e2ee_prefer_mutual";
}

/// End-to-end encryption is on unless switched off explicitly
pub const E2EE_DEFAULT_ENABLED: bool = true;

/// Outgoing headers carry no preference unless configured
pub const E2EE_DEFAULT_PREFER_MUTUAL: bool = false;

/// Default requested key size for generated keypairs
pub const DEFAULT_KEY_BITS: u32 = 2048;

/// Default requested RSA public exponent for generated keypairs
pub const DEFAULT_PUBLIC_EXPONENT: u32 = 65537;

/// Snapshot of the end-to-end encryption settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E2eeConfig {
    /// Whether encryption and peerstate tracking are enabled
    pub enabled: bool,
    /// Own address, normalized; `None` when the account is not configured
    pub configured_addr: Option<String>,
    /// Preference advertised in outgoing Autocrypt headers
    pub prefer_encrypted: PreferEncrypted,
}

impl E2eeConfig {
    /// Read the settings through a locked key store
    pub fn load(guard: &KeyStoreGuard<'_>) -> Result<Self> {
        let enabled = guard.get_config_bool(keys::E2EE_ENABLED, E2EE_DEFAULT_ENABLED)?;
        let configured_addr = guard
            .get_config(keys::CONFIGURED_ADDR)?
            .map(|addr| normalize_addr(&addr))
            .filter(|addr| !addr.is_empty());
        let prefer_mutual =
            guard.get_config_bool(keys::E2EE_PREFER_MUTUAL, E2EE_DEFAULT_PREFER_MUTUAL)?;

        Ok(Self {
            enabled,
            configured_addr,
            prefer_encrypted: if prefer_mutual {
                PreferEncrypted::Mutual
            } else {
                PreferEncrypted::NoPreference
            },
        })
    }
}

/// Canonical form of an e-mail address used as a lookup key
pub fn normalize_addr(addr: &str) -> String {
    addr.trim().to_lowercase()
}

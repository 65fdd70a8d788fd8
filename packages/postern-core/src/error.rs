//! # Error Handling
//!
//! Error types shared by every Postern Core module.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Configuration Errors                                              │
//! │  │   └── InvalidConfig         - Stored value cannot be interpreted    │
//! │  │                                                                      │
//! │  ├── Key Errors                                                        │
//! │  │   ├── KeyGenerationInProgress - Another caller is generating        │
//! │  │   ├── KeyGenerationFailed   - Provider could not create a keypair   │
//! │  │   ├── InvalidKey            - Key material failed validation        │
//! │  │   └── KeyDerivationFailed   - HKDF expansion failed                 │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EncryptionFailed      - Encryption operation failed           │
//! │  │   ├── DecryptionFailed      - Decryption operation failed           │
//! │  │   ├── VerificationFailed    - Signature verification failed         │
//! │  │   └── InvalidArmor          - ASCII armor malformed                 │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── DatabaseError         - SQLite failure                        │
//! │  │   └── StorageCorrupted      - Stored row cannot be decoded          │
//! │  │                                                                      │
//! │  ├── Header Errors                                                     │
//! │  │   └── InvalidAutocryptHeader - Autocrypt header unusable            │
//! │  │                                                                      │
//! │  ├── MIME Errors                                                       │
//! │  │   ├── MimeParse             - Message bytes are not valid MIME      │
//! │  │   └── UnsupportedEncoding   - Unknown Content-Transfer-Encoding     │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Internal              - I/O or unexpected failure             │
//! │      └── (De)SerializationError - JSON or base64 conversion failed     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these errors escape the encrypt and decrypt pipelines as a hard
//! failure. The lower layers (crypto, storage, codecs) return them through
//! `Result`; the pipelines log them and report the skipped step in their
//! outcome values (`EncryptSkip`, `DecryptOutcome`).

use thiserror::Error;

/// Result type alias for Postern Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Postern Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors (100-199)
    // ========================================================================

    /// A configuration value could not be interpreted
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Offending value
        value: String,
    },

    // ========================================================================
    // Key Errors (200-299)
    // ========================================================================

    /// Another caller is currently generating the own keypair
    #[error("Key generation already in progress.")]
    KeyGenerationInProgress,

    /// The crypto provider could not create a keypair
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Key material is malformed or failed validation
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    /// ASCII armor could not be parsed
    #[error("Invalid armor: {0}")]
    InvalidArmor(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be decoded
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Header Errors (500-599)
    // ========================================================================

    /// The Autocrypt header is missing a mandatory attribute or is malformed
    #[error("Invalid Autocrypt header: {0}")]
    InvalidAutocryptHeader(String),

    // ========================================================================
    // MIME Errors (600-699)
    // ========================================================================

    /// The message bytes are not parseable MIME
    #[error("MIME parse error: {0}")]
    MimeParse(String),

    /// The part uses a transfer encoding we cannot decode
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedEncoding(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Configuration
    /// - 200-299: Keys
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Autocrypt header
    /// - 600-699: MIME
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Configuration (100-199)
            Error::InvalidConfig { .. } => 100,

            // Keys (200-299)
            Error::KeyGenerationInProgress => 200,
            Error::KeyGenerationFailed(_) => 201,
            Error::InvalidKey(_) => 202,
            Error::KeyDerivationFailed(_) => 203,

            // Crypto (300-399)
            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::VerificationFailed => 302,
            Error::InvalidArmor(_) => 303,

            // Storage (400-499)
            Error::DatabaseError(_) => 400,
            Error::StorageCorrupted(_) => 401,

            // Header (500-599)
            Error::InvalidAutocryptHeader(_) => 500,

            // MIME (600-699)
            Error::MimeParse(_) => 600,
            Error::UnsupportedEncoding(_) => 601,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors go away on their own; retrying the same
    /// operation later can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::KeyGenerationInProgress | Error::DatabaseError(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DeserializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

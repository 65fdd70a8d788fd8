//! # Database Schema
//!
//! SQL schema definitions for the key store.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY STORE SCHEMA                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │     config      │    │    keypairs     │      │  acpeerstates   │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id              │    │ id              │      │ id              │    │
//! │  │ keyname         │    │ addr            │      │ addr            │    │
//! │  │ value           │    │ is_default      │      │ last_seen       │    │
//! │  └─────────────────┘    │ public_key      │      │ last_seen_      │    │
//! │                         │ private_key     │      │   autocrypt     │    │
//! │                         │ created         │      │ public_key      │    │
//! │                         └─────────────────┘      │ prefer_encrypted│    │
//! │                                                  └─────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Key blobs are stored as `algorithm tag || key bytes`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Key/value configuration (e2ee_enabled, configured_addr, ...)
CREATE TABLE IF NOT EXISTS config (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyname TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL
);

-- Own keypairs
-- More than one row per address can exist after key rotation; exactly one
-- is the default used for outgoing headers, all are tried for decryption.
CREATE TABLE IF NOT EXISTS keypairs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    addr TEXT NOT NULL COLLATE NOCASE,
    is_default INTEGER NOT NULL DEFAULT 0,
    public_key BLOB NOT NULL,
    private_key BLOB NOT NULL,
    created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_keypairs_addr ON keypairs(addr);

-- Autocrypt peerstates, one row per correspondent
CREATE TABLE IF NOT EXISTS acpeerstates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    addr TEXT NOT NULL UNIQUE COLLATE NOCASE,
    -- Date of the newest message that updated this row
    last_seen INTEGER NOT NULL DEFAULT 0,
    -- Date of the newest message carrying a valid Autocrypt header
    last_seen_autocrypt INTEGER NOT NULL DEFAULT 0,
    -- NULL until a key has been seen
    public_key BLOB,
    -- 0 = no preference, 1 = mutual, 20 = no
    prefer_encrypted INTEGER NOT NULL DEFAULT 0
);
"#;

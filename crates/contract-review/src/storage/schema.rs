//! `SQLite` schema definitions for contract-review.

/// Contracts, one row per uploaded file.
pub const CREATE_CONTRACTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS contracts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    contract_type TEXT NOT NULL,
    standard TEXT NOT NULL,
    upload_date TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_size_bytes INTEGER NOT NULL,
    file_type TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    markdown_content TEXT
)
";

/// Listing order is newest upload first.
pub const CREATE_UPLOAD_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_contracts_upload_date ON contracts(upload_date DESC)
";

/// Duplicate upload lookup.
pub const CREATE_CONTENT_HASH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_contracts_hash ON contracts(content_hash)
";

/// Audit rules. `contract_types` is a comma separated list of type slugs.
pub const CREATE_AUDIT_RULES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS audit_rules (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    name TEXT NOT NULL,
    standard TEXT NOT NULL,
    level TEXT NOT NULL,
    description TEXT NOT NULL,
    contract_types TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Risk findings, removed together with their contract.
pub const CREATE_RISK_POINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS risk_points (
    id TEXT PRIMARY KEY,
    contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    risk_type TEXT NOT NULL,
    level TEXT NOT NULL,
    description TEXT NOT NULL,
    location TEXT NOT NULL,
    suggestion TEXT NOT NULL,
    rule_id TEXT,
    excerpt TEXT
)
";

/// Risk points are always read per contract.
pub const CREATE_RISK_CONTRACT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_risk_points_contract ON risk_points(contract_id)
";

/// Payment schedule rows, ordered by `position` within a contract.
pub const CREATE_PAYMENT_TERMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS payment_terms (
    contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    node TEXT NOT NULL,
    ratio TEXT NOT NULL,
    time_regulation TEXT NOT NULL,
    batch TEXT NOT NULL,
    note TEXT NOT NULL,
    PRIMARY KEY (contract_id, position)
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_CONTRACTS_TABLE,
    CREATE_UPLOAD_DATE_INDEX,
    CREATE_CONTENT_HASH_INDEX,
    CREATE_AUDIT_RULES_TABLE,
    CREATE_RISK_POINTS_TABLE,
    CREATE_RISK_CONTRACT_INDEX,
    CREATE_PAYMENT_TERMS_TABLE,
    CREATE_METADATA_TABLE,
];

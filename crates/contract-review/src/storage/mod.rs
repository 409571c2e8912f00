//! Storage layer for contract-review.
//!
//! This module provides `SQLite`-based persistent storage for contracts,
//! audit rules, risk points and payment terms.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    format_file_size, AuditRule, Contract, ContractQuery, ContractStatus, ContractType,
    NewContract, PaymentTerm, RiskCount, RiskDraft, RiskLevel, RiskPoint, RuleDraft, RuleQuery,
};

/// Contract columns in the order [`Storage::row_to_contract`] reads them.
/// The three trailing counts are the risk points per level.
const CONTRACT_COLUMNS: &str = r"
    c.id, c.name, c.contract_type, c.standard, c.upload_date, c.file_name,
    c.file_size_bytes, c.file_type, c.content_hash, c.status,
    (SELECT COUNT(*) FROM risk_points r WHERE r.contract_id = c.id AND r.level = 'high'),
    (SELECT COUNT(*) FROM risk_points r WHERE r.contract_id = c.id AND r.level = 'medium'),
    (SELECT COUNT(*) FROM risk_points r WHERE r.contract_id = c.id AND r.level = 'low')
";

const RULE_COLUMNS: &str = r"
    id, category, name, standard, level, description, contract_types, created_at, updated_at
";

const RISK_COLUMNS: &str = r"
    id, contract_id, category, risk_type, level, description, location, suggestion, rule_id,
    excerpt
";

/// Install the SQL functions the queries rely on.
///
/// `fold_case(text)` lowercases with Rust's Unicode case mapping.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
    )?;
    Ok(())
}

/// Storage engine for contract review data.
///
/// The connection is not `Sync`; callers that share a `Storage` across
/// tasks wrap it in a mutex.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        register_functions(&conn)?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        register_functions(&conn)?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Contracts ===

    /// Insert a contract and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_contract(&self, new: NewContract) -> Result<Contract> {
        let id = Uuid::new_v4().to_string();
        let upload_date = Utc::now().trunc_subsecs(6);

        self.conn.execute(
            r"
            INSERT INTO contracts (
                id, name, contract_type, standard, upload_date, file_name,
                file_size_bytes, file_type, content_hash, status, markdown_content
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                id,
                new.name,
                new.contract_type.as_str(),
                new.standard.as_str(),
                timestamp(upload_date),
                new.file_name,
                i64::try_from(new.file_size_bytes).unwrap_or(i64::MAX),
                new.file_type,
                new.content_hash,
                new.status.as_str(),
                new.markdown_content,
            ],
        )?;

        debug!(id = %id, name = %new.name, "Inserted contract");
        Ok(Contract {
            file_url: Contract::file_url_for(&new.file_name),
            file_size: format_file_size(new.file_size_bytes),
            id,
            name: new.name,
            contract_type: new.contract_type,
            standard: new.standard,
            upload_date,
            file_name: new.file_name,
            file_size_bytes: new.file_size_bytes,
            file_type: new.file_type,
            content_hash: new.content_hash,
            status: new.status,
            markdown_content: new.markdown_content,
            risk_count: RiskCount::default(),
        })
    }

    /// Get a contract including its Markdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_contract(&self, id: &str) -> Result<Option<Contract>> {
        let sql = format!(
            "SELECT {CONTRACT_COLUMNS}, c.markdown_content FROM contracts c WHERE c.id = ?1"
        );
        let contract = self
            .conn
            .query_row(&sql, [id], |row| Self::row_to_contract(row, true))
            .optional()?;
        Ok(contract)
    }

    /// Find a contract with the given content hash, without Markdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_contract_by_hash(&self, content_hash: &str) -> Result<Option<Contract>> {
        let sql = format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts c WHERE c.content_hash = ?1
             ORDER BY c.upload_date DESC LIMIT 1"
        );
        let contract = self
            .conn
            .query_row(&sql, [content_hash], |row| Self::row_to_contract(row, false))
            .optional()?;
        Ok(contract)
    }

    /// List contracts, newest upload first. Markdown is not loaded.
    ///
    /// The name filter folds case with Unicode rules (`Ä` matches `ä`),
    /// which SQLite's own `lower()` only does for ASCII.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_contracts(&self, query: &ContractQuery) -> Result<Vec<Contract>> {
        let sql = format!(
            r"
            SELECT {CONTRACT_COLUMNS} FROM contracts c
            WHERE (?1 IS NULL OR instr(fold_case(c.name), ?1) > 0)
              AND (?2 IS NULL OR c.contract_type = ?2)
            ORDER BY c.upload_date DESC, c.rowid DESC
            LIMIT ?3 OFFSET ?4
            "
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let name = query
            .name_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let contract_type = query.contract_type.map(ContractType::as_str);
        let limit_i64 = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset_i64 = i64::try_from(query.offset).unwrap_or(i64::MAX);

        let contracts = stmt
            .query_map(
                params![name, contract_type, limit_i64, offset_i64],
                |row| Self::row_to_contract(row, false),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(contracts)
    }

    /// Set the review status. Returns `false` if the contract does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_contract_status(&self, id: &str, status: ContractStatus) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE contracts SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    /// Store converted Markdown. Returns `false` if the contract does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_markdown(&self, id: &str, markdown: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE contracts SET markdown_content = ?1 WHERE id = ?2",
            params![markdown, id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a contract with its risk points and payment terms.
    ///
    /// Returns the deleted record, or `None` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_contract(&self, id: &str) -> Result<Option<Contract>> {
        let Some(contract) = self.get_contract(id)? else {
            return Ok(None);
        };
        self.conn.execute("DELETE FROM contracts WHERE id = ?1", [id])?;
        info!(id = %id, "Deleted contract");
        Ok(Some(contract))
    }

    /// Count stored contracts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_contracts(&self) -> Result<i64> {
        self.count("contracts")
    }

    fn contract_exists(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM contracts WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require_contract(&self, id: &str) -> Result<()> {
        if self.contract_exists(id)? {
            Ok(())
        } else {
            Err(Error::not_found("contract", id))
        }
    }

    // === Audit rules ===

    /// Insert one rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_rule(&self, draft: RuleDraft) -> Result<AuditRule> {
        Self::insert_rule_on(&self.conn, draft)
    }

    /// Insert several rules in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is stored in that case.
    pub fn insert_rules(&self, drafts: Vec<RuleDraft>) -> Result<Vec<AuditRule>> {
        let tx = self.conn.unchecked_transaction()?;
        let rules = drafts
            .into_iter()
            .map(|draft| Self::insert_rule_on(&tx, draft))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;

        info!("Imported {} audit rules", rules.len());
        Ok(rules)
    }

    fn insert_rule_on(conn: &Connection, draft: RuleDraft) -> Result<AuditRule> {
        let draft = draft.normalized();
        let today = Utc::now().date_naive();
        let rule = AuditRule {
            id: Uuid::new_v4().to_string(),
            category: draft.category,
            name: draft.name,
            standard: draft.standard,
            level: draft.level,
            description: draft.description,
            contract_types: draft.contract_types,
            created_at: today,
            updated_at: today,
        };

        conn.execute(
            r"
            INSERT INTO audit_rules (
                id, category, name, standard, level, description, contract_types,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                rule.id,
                rule.category,
                rule.name,
                rule.standard,
                rule.level.as_str(),
                rule.description,
                join_types(&rule.contract_types),
                rule.created_at.to_string(),
                rule.updated_at.to_string(),
            ],
        )?;

        debug!(id = %rule.id, name = %rule.name, "Inserted audit rule");
        Ok(rule)
    }

    /// Get a rule by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_rule(&self, id: &str) -> Result<Option<AuditRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM audit_rules WHERE id = ?1");
        let rule = self
            .conn
            .query_row(&sql, [id], Self::row_to_rule)
            .optional()?;
        Ok(rule)
    }

    /// Replace the writable fields of a rule and bump `updated_at`.
    ///
    /// Returns `None` if the rule does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_rule(&self, id: &str, draft: RuleDraft) -> Result<Option<AuditRule>> {
        let draft = draft.normalized();
        let today = Utc::now().date_naive();
        let affected = self.conn.execute(
            r"
            UPDATE audit_rules SET
                category = ?1, name = ?2, standard = ?3, level = ?4, description = ?5,
                contract_types = ?6, updated_at = ?7
            WHERE id = ?8
            ",
            params![
                draft.category,
                draft.name,
                draft.standard,
                draft.level.as_str(),
                draft.description,
                join_types(&draft.contract_types),
                today.to_string(),
                id,
            ],
        )?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_rule(id)
    }

    /// Delete a rule. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_rule(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM audit_rules WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// List rules matching `query`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_rules(&self, query: &RuleQuery) -> Result<Vec<AuditRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM audit_rules ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;

        let mut rules = Vec::new();
        for rule in stmt.query_map([], Self::row_to_rule)? {
            let rule = rule?;
            if query.matches(&rule) {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    // === Risk points and payment terms ===

    /// Record a risk point against a contract.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the contract does not exist, or an error
    /// if the database operation fails.
    pub fn insert_risk_point(&self, contract_id: &str, draft: RiskDraft) -> Result<RiskPoint> {
        self.require_contract(contract_id)?;

        let risk = RiskPoint {
            id: Uuid::new_v4().to_string(),
            contract_id: contract_id.to_string(),
            category: draft.category.trim().to_string(),
            risk_type: draft.risk_type,
            level: draft.level,
            description: draft.description,
            location: draft.location,
            suggestion: draft.suggestion,
            rule_id: draft.rule_id.filter(|id| !id.is_empty()),
            excerpt: draft.excerpt.filter(|text| !text.is_empty()),
        };

        self.conn.execute(
            r"
            INSERT INTO risk_points (
                id, contract_id, category, risk_type, level, description, location,
                suggestion, rule_id, excerpt
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                risk.id,
                risk.contract_id,
                risk.category,
                risk.risk_type.as_str(),
                risk.level.as_str(),
                risk.description,
                risk.location,
                risk.suggestion,
                risk.rule_id,
                risk.excerpt,
            ],
        )?;

        debug!(id = %risk.id, contract_id, level = %risk.level, "Inserted risk point");
        Ok(risk)
    }

    /// Risk points of a contract in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn risk_points(&self, contract_id: &str) -> Result<Vec<RiskPoint>> {
        let sql =
            format!("SELECT {RISK_COLUMNS} FROM risk_points WHERE contract_id = ?1 ORDER BY rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let risks = stmt
            .query_map([contract_id], Self::row_to_risk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(risks)
    }

    /// Number of risk points per level for a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn risk_count(&self, contract_id: &str) -> Result<RiskCount> {
        let mut stmt = self
            .conn
            .prepare("SELECT level FROM risk_points WHERE contract_id = ?1")?;
        let levels = stmt
            .query_map([contract_id], |row| parse_column::<RiskLevel>(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(RiskCount::from_levels(levels))
    }

    /// Replace the payment schedule of a contract.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the contract does not exist, or an error
    /// if the database operation fails.
    pub fn replace_payment_terms(&self, contract_id: &str, terms: &[PaymentTerm]) -> Result<()> {
        self.require_contract(contract_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM payment_terms WHERE contract_id = ?1",
            [contract_id],
        )?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO payment_terms (
                    contract_id, position, node, ratio, time_regulation, batch, note
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            for (position, term) in terms.iter().enumerate() {
                stmt.execute(params![
                    contract_id,
                    i64::try_from(position).unwrap_or(i64::MAX),
                    term.node,
                    term.ratio,
                    term.time_regulation,
                    term.batch,
                    term.note,
                ])?;
            }
        }
        tx.commit()?;

        debug!(contract_id, count = terms.len(), "Replaced payment terms");
        Ok(())
    }

    /// Payment schedule of a contract in stored order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn payment_terms(&self, contract_id: &str) -> Result<Vec<PaymentTerm>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT node, ratio, time_regulation, batch, note
            FROM payment_terms WHERE contract_id = ?1 ORDER BY position
            ",
        )?;
        let terms = stmt
            .query_map([contract_id], |row| {
                Ok(PaymentTerm {
                    node: row.get(0)?,
                    ratio: row.get(1)?,
                    time_regulation: row.get(2)?,
                    batch: row.get(3)?,
                    note: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(terms)
    }

    // === Stats ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT upload_date FROM contracts ORDER BY upload_date DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_contracts: self.count_contracts()?,
            total_rules: self.count("audit_rules")?,
            total_risk_points: self.count("risk_points")?,
            newest_upload: newest
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            db_size_bytes,
        })
    }

    fn count(&self, table: &'static str) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    // === Row mapping ===

    fn row_to_contract(row: &rusqlite::Row, with_markdown: bool) -> rusqlite::Result<Contract> {
        let file_name: String = row.get(5)?;
        let size: i64 = row.get(6)?;
        let file_size_bytes = u64::try_from(size).unwrap_or(0);

        Ok(Contract {
            id: row.get(0)?,
            name: row.get(1)?,
            contract_type: parse_column(row, 2)?,
            standard: parse_column(row, 3)?,
            upload_date: parse_column(row, 4)?,
            file_url: Contract::file_url_for(&file_name),
            file_name,
            file_size: format_file_size(file_size_bytes),
            file_size_bytes,
            file_type: row.get(7)?,
            content_hash: row.get(8)?,
            status: parse_column(row, 9)?,
            risk_count: RiskCount {
                high: row.get(10)?,
                medium: row.get(11)?,
                low: row.get(12)?,
            },
            markdown_content: if with_markdown { row.get(13)? } else { None },
        })
    }

    fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<AuditRule> {
        let types: String = row.get(6)?;
        Ok(AuditRule {
            id: row.get(0)?,
            category: row.get(1)?,
            name: row.get(2)?,
            standard: row.get(3)?,
            level: parse_column(row, 4)?,
            description: row.get(5)?,
            contract_types: types
                .split(',')
                .filter_map(|slug| slug.parse::<ContractType>().ok())
                .collect(),
            created_at: parse_column::<NaiveDate>(row, 7)?,
            updated_at: parse_column::<NaiveDate>(row, 8)?,
        })
    }

    fn row_to_risk(row: &rusqlite::Row) -> rusqlite::Result<RiskPoint> {
        Ok(RiskPoint {
            id: row.get(0)?,
            contract_id: row.get(1)?,
            category: row.get(2)?,
            risk_type: parse_column(row, 3)?,
            level: parse_column(row, 4)?,
            description: row.get(5)?,
            location: row.get(6)?,
            suggestion: row.get(7)?,
            rule_id: row.get(8)?,
            excerpt: row.get(9)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of contracts.
    pub total_contracts: i64,
    /// Number of audit rules.
    pub total_rules: i64,
    /// Number of risk points across all contracts.
    pub total_risk_points: i64,
    /// Upload time of the newest contract.
    pub newest_upload: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn join_types(types: &[ContractType]) -> String {
    types
        .iter()
        .map(|ty| ty.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Read a text column through `FromStr`.
fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.get(idx)?;
    value
        .parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

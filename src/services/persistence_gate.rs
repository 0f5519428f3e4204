use sqlx::PgPool;

use crate::dal::company_db;
use crate::domain::company::{website_identity_key, CompanyRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// The decision taken for an incoming record against what the store already
/// holds. Pure, so the merge semantics are testable without a database.
pub fn decide_upsert(
    existing: Option<&CompanyRecord>,
    incoming: &CompanyRecord,
) -> (UpsertOutcome, CompanyRecord) {
    match existing {
        None => (UpsertOutcome::Inserted, incoming.clone()),
        Some(existing) => {
            let merged = existing.overlaid_with(incoming);
            match merged == *existing {
                true => (UpsertOutcome::Skipped, merged),
                false => (UpsertOutcome::Updated, merged),
            }
        }
    }
}

/// Sole writer to the durable store: deduplicates by (name, normalized
/// website) and performs an idempotent, field-level-merge upsert.
pub struct PersistenceGate {
    pool: PgPool,
}

impl PersistenceGate {
    pub fn new(pool: PgPool) -> Self {
        PersistenceGate { pool }
    }

    pub async fn upsert(&self, record: &CompanyRecord) -> Result<UpsertOutcome, sqlx::Error> {
        let website_key = record
            .website
            .as_deref()
            .map(website_identity_key)
            .unwrap_or_default();

        let existing = company_db::find_company(&self.pool, &record.name, &website_key).await?;
        let (outcome, merged) = decide_upsert(existing.as_ref(), record);

        match outcome {
            UpsertOutcome::Inserted => {
                company_db::insert_company(&self.pool, &merged, &website_key).await?;
            }
            UpsertOutcome::Updated => {
                company_db::update_company(&self.pool, &merged, &website_key).await?;
            }
            UpsertOutcome::Skipped => {}
        }

        Ok(outcome)
    }

    /// Whether a company is already known, and its stored record if so.
    pub async fn find_existing(
        &self,
        name: &str,
        website: &str,
    ) -> Result<Option<CompanyRecord>, sqlx::Error> {
        company_db::find_company(&self.pool, name, &website_identity_key(website)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::financials::FinancialSnapshot;

    fn record(name: &str) -> CompanyRecord {
        let mut r = CompanyRecord::new(name, Some("https://acme.com".to_string()));
        // Pin the timestamp so equality comparisons are deterministic.
        r.financials = FinancialSnapshot {
            as_of: chrono::DateTime::UNIX_EPOCH,
            ..FinancialSnapshot::none()
        };
        r
    }

    #[test]
    fn absent_record_is_inserted() {
        let incoming = record("Acme");
        let (outcome, merged) = decide_upsert(None, &incoming);
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn identical_record_is_skipped() {
        let stored = record("Acme");
        let (outcome, _) = decide_upsert(Some(&stored), &stored.clone());
        assert_eq!(outcome, UpsertOutcome::Skipped);
    }

    #[test]
    fn merge_is_field_level() {
        let mut stored = record("Acme");
        stored.industry = Some("Tech".to_string());

        let mut incoming = record("Acme");
        incoming.employee_count = Some(500);

        let (outcome, merged) = decide_upsert(Some(&stored), &incoming);

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(merged.industry, Some("Tech".to_string()));
        assert_eq!(merged.employee_count, Some(500));
    }

    #[test]
    fn incoming_non_null_overrides_stored() {
        let mut stored = record("Acme");
        stored.industry = Some("Tech".to_string());

        let mut incoming = record("Acme");
        incoming.industry = Some("Aerospace".to_string());

        let (outcome, merged) = decide_upsert(Some(&stored), &incoming);

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(merged.industry, Some("Aerospace".to_string()));
    }
}

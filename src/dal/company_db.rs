use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::company::CompanyRecord;
use crate::domain::financials::{FinancialSnapshot, FinancialSource};

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        create table if not exists company (
            id uuid primary key,
            name text not null,
            website_key text not null,
            website text,
            description text,
            software_classification text,
            enterprise_grade boolean,
            industry text,
            customers text,
            employee_count bigint,
            investors text[] not null default '{}',
            geography text,
            parent_company text,
            street_address text,
            city text,
            postal_code text,
            country text,
            email text,
            phone text,
            ticker text,
            market_cap double precision,
            revenue double precision,
            financial_source text not null default 'none',
            financials_as_of timestamptz not null default now(),
            updated_at timestamptz not null default now(),
            unique (name, website_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_company(
    pool: &PgPool,
    name: &str,
    website_key: &str,
) -> Result<Option<CompanyRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        select
            name, website, description, software_classification, enterprise_grade,
            industry, customers, employee_count, investors, geography,
            parent_company, street_address, city, postal_code, country,
            email, phone, ticker, market_cap, revenue, financial_source,
            financials_as_of
        from company
        where name = $1 and website_key = $2
        "#,
    )
    .bind(name)
    .bind(website_key)
    .fetch_optional(pool)
    .await?;

    row.map(record_from_row).transpose()
}

fn record_from_row(row: PgRow) -> Result<CompanyRecord, sqlx::Error> {
    let source: String = row.try_get("financial_source")?;
    let as_of: DateTime<Utc> = row.try_get("financials_as_of")?;

    Ok(CompanyRecord {
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        description: row.try_get("description")?,
        software_classification: row.try_get("software_classification")?,
        enterprise_grade: row.try_get("enterprise_grade")?,
        industry: row.try_get("industry")?,
        customers: row.try_get("customers")?,
        employee_count: row.try_get("employee_count")?,
        investors: row.try_get("investors")?,
        geography: row.try_get("geography")?,
        parent_company: row.try_get("parent_company")?,
        street_address: row.try_get("street_address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        financials: FinancialSnapshot {
            ticker: row.try_get("ticker")?,
            market_cap: row.try_get("market_cap")?,
            revenue: row.try_get("revenue")?,
            source: FinancialSource::from_str_or_none(&source),
            as_of,
        },
    })
}

pub async fn insert_company(
    pool: &PgPool,
    record: &CompanyRecord,
    website_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        insert into company
            (id, name, website_key, website, description, software_classification,
             enterprise_grade, industry, customers, employee_count, investors,
             geography, parent_company, street_address, city, postal_code,
             country, email, phone, ticker, market_cap, revenue,
             financial_source, financials_as_of)
        values
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
             $16, $17, $18, $19, $20, $21, $22, $23, $24)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&record.name)
    .bind(website_key)
    .bind(&record.website)
    .bind(&record.description)
    .bind(&record.software_classification)
    .bind(record.enterprise_grade)
    .bind(&record.industry)
    .bind(&record.customers)
    .bind(record.employee_count)
    .bind(&record.investors)
    .bind(&record.geography)
    .bind(&record.parent_company)
    .bind(&record.street_address)
    .bind(&record.city)
    .bind(&record.postal_code)
    .bind(&record.country)
    .bind(&record.email)
    .bind(&record.phone)
    .bind(&record.financials.ticker)
    .bind(record.financials.market_cap)
    .bind(record.financials.revenue)
    .bind(record.financials.source.as_str())
    .bind(record.financials.as_of)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_company(
    pool: &PgPool,
    record: &CompanyRecord,
    website_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        update company set
            website = $3,
            description = $4,
            software_classification = $5,
            enterprise_grade = $6,
            industry = $7,
            customers = $8,
            employee_count = $9,
            investors = $10,
            geography = $11,
            parent_company = $12,
            street_address = $13,
            city = $14,
            postal_code = $15,
            country = $16,
            email = $17,
            phone = $18,
            ticker = $19,
            market_cap = $20,
            revenue = $21,
            financial_source = $22,
            financials_as_of = $23,
            updated_at = now()
        where name = $1 and website_key = $2
        "#,
    )
    .bind(&record.name)
    .bind(website_key)
    .bind(&record.website)
    .bind(&record.description)
    .bind(&record.software_classification)
    .bind(record.enterprise_grade)
    .bind(&record.industry)
    .bind(&record.customers)
    .bind(record.employee_count)
    .bind(&record.investors)
    .bind(&record.geography)
    .bind(&record.parent_company)
    .bind(&record.street_address)
    .bind(&record.city)
    .bind(&record.postal_code)
    .bind(&record.country)
    .bind(&record.email)
    .bind(&record.phone)
    .bind(&record.financials.ticker)
    .bind(record.financials.market_cap)
    .bind(record.financials.revenue)
    .bind(record.financials.source.as_str())
    .bind(record.financials.as_of)
    .execute(pool)
    .await?;

    Ok(())
}

use std::fs::File;

use anyhow::Result;

use crate::domain::company::CompanyRecord;
use crate::domain::financials::format_compact;

/// Tabular export of a run's final records. Raw financial numerics are
/// rendered in compact form here and nowhere else.
pub fn export_csv(records: &[CompanyRecord], output_path: &str) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "Company Name",
        "Website",
        "Description",
        "Software Classification",
        "Enterprise Grade",
        "Industry",
        "Customers",
        "Employee Count",
        "Investors",
        "Geography",
        "Parent Company",
        "Street Address",
        "City",
        "Postal Code",
        "Country",
        "Email",
        "Phone",
        "Ticker",
        "Market Cap",
        "Revenue",
        "Financial Source",
    ])?;

    for record in records {
        writer.write_record([
            record.name.clone(),
            field(&record.website),
            field(&record.description),
            field(&record.software_classification),
            record
                .enterprise_grade
                .map(|b| b.to_string())
                .unwrap_or_default(),
            field(&record.industry),
            field(&record.customers),
            record
                .employee_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
            record.investors.join("; "),
            field(&record.geography),
            field(&record.parent_company),
            field(&record.street_address),
            field(&record.city),
            field(&record.postal_code),
            field(&record.country),
            field(&record.email),
            field(&record.phone),
            field(&record.financials.ticker),
            record
                .financials
                .market_cap
                .map(format_compact)
                .unwrap_or_default(),
            record
                .financials
                .revenue
                .map(format_compact)
                .unwrap_or_default(),
            record.financials.source.as_str().to_string(),
        ])?;
    }

    writer.flush()?;
    log::info!("Exported {} records to {}", records.len(), output_path);
    Ok(())
}

fn field(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

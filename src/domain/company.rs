use serde::{Deserialize, Serialize};
use url::Url;

use super::financials::FinancialSnapshot;

/// The canonical output unit of a pipeline run. `name` plus the normalized
/// website form the identity key for deduplication; every other field is
/// independently nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub software_classification: Option<String>,
    pub enterprise_grade: Option<bool>,
    pub industry: Option<String>,
    pub customers: Option<String>,
    pub employee_count: Option<i64>,
    pub investors: Vec<String>,
    pub geography: Option<String>,
    pub parent_company: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub financials: FinancialSnapshot,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CompanyRecord {
    pub fn new(name: &str, website: Option<String>) -> Self {
        CompanyRecord {
            name: name.to_string(),
            website,
            description: None,
            software_classification: None,
            enterprise_grade: None,
            industry: None,
            customers: None,
            employee_count: None,
            investors: vec![],
            geography: None,
            parent_company: None,
            street_address: None,
            city: None,
            postal_code: None,
            country: None,
            financials: FinancialSnapshot::none(),
            email: None,
            phone: None,
        }
    }

    /// Take values from `other` only where this record has none. Used for the
    /// primary-wins strategy merge: whatever the primary extractor produced
    /// stays, the fallback only fills the gaps.
    pub fn fill_missing_from(&mut self, other: CompanyRecord) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.website, other.website);
        fill(&mut self.description, other.description);
        fill(
            &mut self.software_classification,
            other.software_classification,
        );
        fill(&mut self.enterprise_grade, other.enterprise_grade);
        fill(&mut self.industry, other.industry);
        fill(&mut self.customers, other.customers);
        fill(&mut self.employee_count, other.employee_count);
        fill(&mut self.geography, other.geography);
        fill(&mut self.parent_company, other.parent_company);
        fill(&mut self.street_address, other.street_address);
        fill(&mut self.city, other.city);
        fill(&mut self.postal_code, other.postal_code);
        fill(&mut self.country, other.country);
        fill(&mut self.email, other.email);
        fill(&mut self.phone, other.phone);

        if self.investors.is_empty() {
            self.investors = other.investors;
        }
        if self.financials.is_empty() {
            self.financials = other.financials;
        }
    }

    /// Field-level last-write-wins: incoming non-null values override the
    /// stored ones. Used by the persistence gate when a record already exists.
    pub fn overlaid_with(&self, incoming: &CompanyRecord) -> CompanyRecord {
        let mut merged = incoming.clone();
        merged.name = self.name.clone();
        merged.fill_missing_from(self.clone());
        merged
    }
}

/// One parsed line of the input list: `CompanyName` or `CompanyName|domain`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyInput {
    pub name: String,
    pub website_override: Option<String>,
}

pub fn parse_input_line(line: &str) -> Option<CompanyInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match line.split_once('|') {
        Some((name, domain)) => Some(CompanyInput {
            name: name.trim().to_string(),
            website_override: Some(domain.trim().to_string()),
        }),
        None => Some(CompanyInput {
            name: line.to_string(),
            website_override: None,
        }),
    }
}

/// Default the scheme to https and drop the trailing slash so that overrides
/// and search results end up in the same shape.
pub fn normalize_website(raw: &str) -> String {
    let raw = raw.trim();
    let with_scheme = match raw.starts_with("http://") || raw.starts_with("https://") {
        true => raw.to_string(),
        false => format!("https://{}", raw),
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// The website half of the identity key: lowercase host without the `www.`
/// prefix. Falls back to the raw string when it does not parse as a URL.
pub fn website_identity_key(website: &str) -> String {
    let normalized = normalize_website(website);
    match Url::parse(&normalized) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => {
                let host = host.to_lowercase();
                match host.strip_prefix("www.") {
                    Some(h) => h.to_string(),
                    None => host,
                }
            }
            None => normalized,
        },
        Err(_) => normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_line_plain_name() {
        let input = parse_input_line("Tesla\n").unwrap();
        assert_eq!(input.name, "Tesla");
        assert_eq!(input.website_override, None);
    }

    #[test]
    fn parse_input_line_with_override() {
        let input = parse_input_line("Tesla | tesla.com").unwrap();
        assert_eq!(input.name, "Tesla");
        assert_eq!(input.website_override, Some("tesla.com".to_string()));
    }

    #[test]
    fn parse_input_line_blank() {
        assert_eq!(parse_input_line("   "), None);
    }

    #[test]
    fn normalize_website_defaults_scheme() {
        assert_eq!(normalize_website("tesla.com/"), "https://tesla.com");
        assert_eq!(
            normalize_website("http://tesla.com"),
            "http://tesla.com"
        );
    }

    #[test]
    fn website_identity_key_strips_www_and_case() {
        assert_eq!(website_identity_key("https://WWW.Tesla.com/"), "tesla.com");
        assert_eq!(website_identity_key("tesla.com"), "tesla.com");
    }

    #[test]
    fn fill_missing_keeps_primary_values() {
        let mut primary = CompanyRecord::new("Acme", None);
        primary.industry = Some("Software".to_string());

        let mut fallback = CompanyRecord::new("Acme", None);
        fallback.industry = Some("Retail".to_string());
        fallback.email = Some("a@b.com".to_string());

        primary.fill_missing_from(fallback);

        assert_eq!(primary.industry, Some("Software".to_string()));
        assert_eq!(primary.email, Some("a@b.com".to_string()));
    }

    #[test]
    fn overlay_incoming_non_null_wins() {
        let mut existing = CompanyRecord::new("Acme", None);
        existing.industry = Some("Tech".to_string());

        let mut incoming = CompanyRecord::new("Acme", None);
        incoming.employee_count = Some(500);

        let merged = existing.overlaid_with(&incoming);

        assert_eq!(merged.industry, Some("Tech".to_string()));
        assert_eq!(merged.employee_count, Some(500));
    }
}

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

use crate::domain::company::CompanyRecord;

use super::{OpenaiClient, PageText, Provider, RateLimiter};

/// Character budget for the concatenated page text handed to the model.
/// Pages are already ordered by relevance, so truncation drops the least
/// relevant content first.
const MAX_PROMPT_CHARS: usize = 150_000;

/// Maps (company name, website, fetched page texts) to a partial
/// CompanyRecord. The AI strategy runs first; the deterministic pattern
/// strategy only fills fields the AI left null. Total failure of both is a
/// record of nulls, never an error.
pub struct StructuredExtractor {
    openai: Arc<OpenaiClient>,
    rate_limiter: Arc<RateLimiter>,
}

impl StructuredExtractor {
    pub fn new(openai: Arc<OpenaiClient>, rate_limiter: Arc<RateLimiter>) -> Self {
        StructuredExtractor {
            openai,
            rate_limiter,
        }
    }

    pub async fn extract(
        &self,
        company_name: &str,
        website: &str,
        contents: &[(String, PageText)],
    ) -> CompanyRecord {
        let combined = combine_contents(contents);

        let mut record = match self
            .extract_with_model(company_name, website, &combined)
            .await
        {
            Some(record) => record,
            None => CompanyRecord::new(company_name, Some(website.to_string())),
        };

        // Fallback fills only the fields the primary strategy left null.
        let fallback = extract_with_patterns(company_name, website, &combined);
        record.fill_missing_from(fallback);
        if record.description.is_none() {
            record.description = first_meta_description(contents);
        }
        record
    }

    async fn extract_with_model(
        &self,
        company_name: &str,
        website: &str,
        content: &str,
    ) -> Option<CompanyRecord> {
        for narrow_retry in [false, true] {
            if self.rate_limiter.try_acquire(Provider::Ai).is_err() {
                log::warn!(
                    "AI quota exhausted, pattern-only extraction for {}",
                    company_name
                );
                return None;
            }

            match self
                .openai
                .extract_company_fields(company_name, website, content, narrow_retry)
                .await
            {
                Ok(fields) => {
                    return Some(record_from_fields(company_name, website, &fields));
                }
                Err(e) => {
                    log::warn!(
                        "AI extraction failed for {} (narrow retry: {}): {:?}",
                        company_name,
                        narrow_retry,
                        e
                    );
                }
            }
        }
        None
    }
}

/// Concatenate fetched texts in relevance order under the prompt budget. Meta
/// descriptions lead their page so the model sees the site's own summary.
pub fn combine_contents(contents: &[(String, PageText)]) -> String {
    let mut combined = String::new();
    for (url, page) in contents {
        if combined.len() >= MAX_PROMPT_CHARS {
            break;
        }
        let remaining = MAX_PROMPT_CHARS - combined.len();
        let section = match &page.meta_description {
            Some(meta) => format!("[{}] {} {} ", url, meta, page.body),
            None => format!("[{}] {} ", url, page.body),
        };
        match section.len() <= remaining {
            true => combined.push_str(&section),
            false => {
                let mut cut = remaining;
                while !section.is_char_boundary(cut) {
                    cut -= 1;
                }
                combined.push_str(&section[..cut]);
            }
        }
    }
    combined
}

/// Defensive mapping from the model's JSON object into typed fields. Models
/// return strings where numbers belong and prose where booleans belong, so
/// every field is coerced individually and anything unusable becomes null.
pub fn record_from_fields(company_name: &str, website: &str, fields: &Value) -> CompanyRecord {
    let mut record = CompanyRecord::new(company_name, Some(website.to_string()));

    record.description = string_field(fields, "description");
    record.industry = string_field(fields, "industry");
    record.software_classification = string_field(fields, "software_classification");
    record.enterprise_grade = bool_field(fields, "enterprise_grade");
    record.geography = string_field(fields, "geography");
    record.street_address = string_field(fields, "street_address");
    record.city = string_field(fields, "city");
    record.postal_code = string_field(fields, "postal_code");
    record.country = string_field(fields, "country");
    record.phone = string_field(fields, "phone");
    record.email = string_field(fields, "email");
    record.employee_count = count_field(fields, "employee_count");
    record.customers = string_or_list_field(fields, "customers");
    record.investors = list_field(fields, "investors");
    record.parent_company = string_field(fields, "parent_company");

    record
}

fn string_field(fields: &Value, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            match trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                true => None,
                false => Some(trimmed.to_string()),
            }
        }
        _ => None,
    }
}

fn bool_field(fields: &Value, key: &str) -> Option<bool> {
    match fields.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn count_field(fields: &Value, key: &str) -> Option<i64> {
    match fields.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn list_field(fields: &Value, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => vec![],
    }
}

/// The pattern strategy's source for `description`: the first fetched page
/// that carried a meta description. Pages arrive in relevance order.
pub fn first_meta_description(contents: &[(String, PageText)]) -> Option<String> {
    contents
        .iter()
        .find_map(|(_, page)| page.meta_description.clone())
}

fn string_or_list_field(fields: &Value, key: &str) -> Option<String> {
    let joined = list_field(fields, key).join(", ");
    match joined.is_empty() {
        true => string_field(fields, key),
        false => Some(joined),
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.\-+]+@[\w.\-]+\.\w{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:phone|tel|call us)[:\s]+(\+?[\d\s()\-]{7,20})").unwrap())
}

fn industry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)industry[:\s]+([^.\n|]{3,60})").unwrap())
}

fn employees_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d[\d,]{0,9})\s*\+?\s*employees").unwrap())
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)address[:\s]+([^.\n|]{5,150})").unwrap())
}

/// Deterministic pattern strategy over the raw text: regular expressions for
/// contact data and keyword proximity for industry and headcount.
pub fn extract_with_patterns(company_name: &str, website: &str, content: &str) -> CompanyRecord {
    let mut record = CompanyRecord::new(company_name, Some(website.to_string()));

    record.email = email_re()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .find(|email| {
            let lowered = email.to_lowercase();
            !["noreply", "no-reply", "donotreply", "example.com", "sentry"]
                .iter()
                .any(|junk| lowered.contains(junk))
        });

    record.phone = phone_re()
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .filter(|p| p.chars().filter(|ch| ch.is_ascii_digit()).count() >= 7);

    record.industry = industry_re()
        .captures(content)
        .map(|c| c[1].trim().to_string());

    record.employee_count = employees_re()
        .captures(content)
        .and_then(|c| c[1].replace(',', "").parse().ok());

    if let Some(address) = address_re()
        .captures(content)
        .map(|c| c[1].trim().to_string())
    {
        let parts: Vec<&str> = address.split(',').map(str::trim).collect();
        record.street_address = parts.first().map(|s| s.to_string());
        if parts.len() >= 3 {
            record.city = parts.get(1).map(|s| s.to_string());
            record.country = parts.last().map(|s| s.to_string());
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_coerced_defensively() {
        let fields = json!({
            "description": "Makes rockets",
            "industry": "  Aerospace ",
            "enterprise_grade": "Yes",
            "employee_count": "12,000+",
            "investors": ["Sequoia", " a16z "],
            "customers": ["NASA", "ESA"],
            "email": "",
            "parent_company": null
        });
        let record = record_from_fields("Acme", "https://acme.com", &fields);

        assert_eq!(record.description, Some("Makes rockets".to_string()));
        assert_eq!(record.industry, Some("Aerospace".to_string()));
        assert_eq!(record.enterprise_grade, Some(true));
        assert_eq!(record.employee_count, Some(12000));
        assert_eq!(record.investors, vec!["Sequoia", "a16z"]);
        assert_eq!(record.customers, Some("NASA, ESA".to_string()));
        assert_eq!(record.email, None);
        assert_eq!(record.parent_company, None);
    }

    #[test]
    fn pattern_strategy_finds_contact_details() {
        let content = "Get in touch. Email: sales@acme.com or noreply@acme.com. \
                       Phone: +1 (512) 555-0100. Address: 100 Main St, Austin, 78701, USA. \
                       We have 1,200 employees. Industry: Industrial Automation | more";
        let record = extract_with_patterns("Acme", "https://acme.com", content);

        assert_eq!(record.email, Some("sales@acme.com".to_string()));
        assert_eq!(record.phone, Some("+1 (512) 555-0100".to_string()));
        assert_eq!(record.street_address, Some("100 Main St".to_string()));
        assert_eq!(record.city, Some("Austin".to_string()));
        assert_eq!(record.country, Some("USA".to_string()));
        assert_eq!(record.employee_count, Some(1200));
        assert_eq!(record.industry, Some("Industrial Automation".to_string()));
    }

    #[test]
    fn pattern_strategy_empty_content_is_all_null() {
        let record = extract_with_patterns("Acme", "https://acme.com", "");
        assert_eq!(record.email, None);
        assert_eq!(record.phone, None);
        assert_eq!(record.industry, None);
        assert_eq!(record.employee_count, None);
    }

    #[test]
    fn primary_wins_fallback_fills_nulls() {
        let fields = json!({ "industry": "Software" });
        let mut primary = record_from_fields("Acme", "https://acme.com", &fields);

        let fallback = extract_with_patterns(
            "Acme",
            "https://acme.com",
            "Industry: Retail. Email: contact@acme.com",
        );
        primary.fill_missing_from(fallback);

        assert_eq!(primary.industry, Some("Software".to_string()));
        assert_eq!(primary.email, Some("contact@acme.com".to_string()));
    }

    fn page(body: &str, meta: Option<&str>) -> PageText {
        PageText {
            body: body.to_string(),
            meta_description: meta.map(String::from),
        }
    }

    #[test]
    fn combine_contents_respects_budget_and_order() {
        let contents = vec![
            ("https://a.com/about".to_string(), page("first page", None)),
            ("https://a.com/team".to_string(), page("second page", None)),
        ];
        let combined = combine_contents(&contents);

        assert!(combined.starts_with("[https://a.com/about] first page"));
        assert!(combined.contains("second page"));

        let huge = vec![(
            "https://a.com".to_string(),
            page(&"x".repeat(MAX_PROMPT_CHARS * 2), None),
        )];
        assert!(combine_contents(&huge).len() <= MAX_PROMPT_CHARS);
    }

    #[test]
    fn combine_contents_leads_with_meta_description() {
        let contents = vec![(
            "https://a.com".to_string(),
            page("Welcome to our site", Some("Acme builds robots.")),
        )];
        assert!(combine_contents(&contents)
            .starts_with("[https://a.com] Acme builds robots. Welcome to our site"));
    }

    #[test]
    fn first_meta_description_follows_relevance_order() {
        let contents = vec![
            ("https://a.com/blog".to_string(), page("posts", None)),
            (
                "https://a.com/about".to_string(),
                page("about us", Some("Acme builds robots.")),
            ),
            (
                "https://a.com/team".to_string(),
                page("team", Some("Meet the team.")),
            ),
        ];
        assert_eq!(
            first_meta_description(&contents),
            Some("Acme builds robots.".to_string())
        );
        assert_eq!(first_meta_description(&[]), None);
    }
}

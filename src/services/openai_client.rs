use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use regex::Regex;

const MODEL: &str = "gpt-4o-mini";
const MAX_URLS_IN_PROMPT: usize = 200;

pub struct OpenaiClient {
    client: Client<OpenAIConfig>,
}

impl Default for OpenaiClient {
    fn default() -> Self {
        OpenaiClient {
            client: Client::new(),
        }
    }
}

impl OpenaiClient {
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenaiClient {
            client: Client::with_config(config),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(MODEL)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into()])
            .max_tokens(max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No content in model response"))
    }

    /// Ask the model which sitemap URLs are most likely to carry
    /// company-profile content. Best effort; the caller falls back to keyword
    /// ranking when this fails or comes back empty.
    pub async fn rank_candidate_urls(
        &self,
        company_name: &str,
        base_url: &str,
        urls: &[String],
        limit: usize,
    ) -> Result<Vec<String>> {
        let shown: Vec<&String> = urls.iter().take(MAX_URLS_IN_PROMPT).collect();
        let prompt = format!(
            "I'm researching the company '{}' with website {}.\n\
             I need pages covering: company description, industry, leadership, \
             customers, investors, employee headcount, contact details and address.\n\
             Here is a list of URLs from their sitemap:\n{:?}\n\
             Based on the URL patterns, return the {} URLs most useful to scrape \
             for this information, as a JSON array of URL strings only.",
            company_name, base_url, shown, limit
        );

        let response = self.complete(&prompt, 1000).await?;
        let ranked = parse_url_list(&response);
        match ranked.is_empty() {
            true => Err(anyhow!("No URLs in ranking response")),
            false => Ok(ranked),
        }
    }

    /// One structured-extraction request over the concatenated page text.
    /// Returns the parsed JSON object; a response that cannot be parsed is an
    /// error so the caller can re-prompt or fall back.
    pub async fn extract_company_fields(
        &self,
        company_name: &str,
        website: &str,
        content: &str,
        narrow_retry: bool,
    ) -> Result<serde_json::Value> {
        let strictness = match narrow_retry {
            true => {
                "Respond with ONLY a single JSON object, no prose, no markdown fence. \
                 Use null for any field you cannot find."
            }
            false => {
                "Format your response as a JSON object with exactly these fields, \
                 using null for any information you cannot find."
            }
        };

        let prompt = format!(
            "Extract information about the company '{}' with website {} from the \
             following scraped website content.\n\
             Fields: description, industry, software_classification, \
             enterprise_grade (boolean), geography, street_address, city, \
             postal_code, country, phone, email, employee_count (integer), \
             customers, investors (array of strings), parent_company.\n\
             {}\n\nContent:\n{}",
            company_name, website, strictness, content
        );

        let response = self.complete(&prompt, 2000).await?;
        let payload = extract_json_object(&response)
            .ok_or_else(|| anyhow!("No JSON object in model response"))?;

        Ok(serde_json::from_str(&payload)?)
    }
}

/// Pull the JSON object out of a model response, tolerating markdown fences
/// and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<String> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
    if let Some(captures) = fence.captures(text) {
        return Some(captures[1].to_string());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        return Some(text[start..=end].to_string());
    }
    None
}

/// Parse a ranked URL list out of a model response: a JSON array when
/// possible, otherwise anything URL-shaped in the text.
pub fn parse_url_list(text: &str) -> Vec<String> {
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if end > start {
            if let Ok(urls) = serde_json::from_str::<Vec<String>>(&text[start..=end]) {
                return urls;
            }
        }
    }

    let url_re = Regex::new(r#"https?://[^\s"'\]\),]+"#).unwrap();
    url_re
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_inside_fence() {
        let text = "Here you go:\n```json\n{\"industry\": \"Software\"}\n```\nDone.";
        assert_eq!(
            extract_json_object(text),
            Some("{\"industry\": \"Software\"}".to_string())
        );
    }

    #[test]
    fn json_object_bare_braces() {
        let text = "Sure. {\"industry\": null, \"city\": \"Austin\"} hope that helps";
        let payload = extract_json_object(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["city"], "Austin");
    }

    #[test]
    fn no_json_object_is_none() {
        assert_eq!(extract_json_object("I could not find anything."), None);
    }

    #[test]
    fn url_list_from_json_array() {
        let text = "```json\n[\"https://a.com/about\", \"https://a.com/team\"]\n```";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.com/about", "https://a.com/team"]
        );
    }

    #[test]
    fn url_list_from_prose() {
        let text = "You should scrape https://a.com/about and https://a.com/contact.";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.com/about", "https://a.com/contact"]
        );
    }
}

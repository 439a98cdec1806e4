//! Web search for topics outside the knowledge base. Tavily is the primary
//! provider, Brave the fallback; every result set carries the unverified
//! disclaimer, appended by the tool itself.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{Tool, ToolSourceError, ToolSpec};

/// Appended to every web result so downstream formatting cannot lose it.
pub const WEB_DISCLAIMER: &str = "\n\n---\n*Note: This information was sourced from the web and has \
not been verified against Nusa Atlas's official knowledge base. For visa, legal, tax, or business \
setup questions, please refer to our verified documentation or contact the team directly.*";

const TAVILY_URL: &str = "https://api.tavily.com/search";
const BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_RESULTS: u64 = 10;

pub struct WebSearchTool {
    client: reqwest::Client,
    tavily_key: Option<String>,
    brave_key: Option<String>,
}

impl WebSearchTool {
    /// Reads `TAVILY_API_KEY` / `BRAVE_API_KEY` from the environment.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty()),
            std::env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty()),
        )
    }

    pub fn new(tavily_key: Option<String>, brave_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tavily_key,
            brave_key,
        }
    }

    async fn search_tavily(
        &self,
        query: &str,
        num_results: u64,
        key: &str,
    ) -> Result<serde_json::Value, ToolSourceError> {
        let body = json!({
            "api_key": key,
            "query": query,
            "max_results": num_results,
            "search_depth": "basic",
            "include_answer": true,
        });
        let res = self
            .client
            .post(TAVILY_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            return Err(ToolSourceError::Transport(format!(
                "Tavily error {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))
    }

    async fn search_brave(
        &self,
        query: &str,
        num_results: u64,
        key: &str,
    ) -> Result<serde_json::Value, ToolSourceError> {
        let count = num_results.to_string();
        let res = self
            .client
            .get(BRAVE_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .query(&[("q", query), ("count", count.as_str()), ("search_lang", "en")])
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            return Err(ToolSourceError::Transport(format!(
                "Brave error {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))
    }
}

struct WebHit {
    title: String,
    content: String,
    url: String,
}

fn tavily_hits(data: &serde_json::Value) -> Vec<WebHit> {
    data.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| WebHit {
                    title: r
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or("Untitled")
                        .to_string(),
                    content: r
                        .get("content")
                        .and_then(|c| c.as_str())
                        .unwrap_or("")
                        .to_string(),
                    url: r.get("url").and_then(|u| u.as_str()).unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn brave_hits(data: &serde_json::Value) -> Vec<WebHit> {
    data.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| WebHit {
                    title: r
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or("Untitled")
                        .to_string(),
                    content: r
                        .get("description")
                        .and_then(|c| c.as_str())
                        .unwrap_or("")
                        .replace("<strong>", "")
                        .replace("</strong>", ""),
                    url: r.get("url").and_then(|u| u.as_str()).unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".to_string(),
            description: Some(
                "Search the web for information NOT available in the knowledge base: tourism, \
                 restaurants, lifestyle, current events, local market context. DO NOT use for \
                 visas, KITAS, PT PMA, taxes, or legal topics - use vector_search instead. \
                 Web results are NOT verified and will include a disclaimer."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query in natural language"
                    },
                    "num_results": {
                        "type": "integer",
                        "description": "Number of results to return (default: 5, max: 10)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidArguments("query is required".into()))?;
        let num_results = args
            .get("num_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, MAX_RESULTS);

        if self.tavily_key.is_none() && self.brave_key.is_none() {
            warn!("web search called without provider keys");
            return Ok(json!({
                "success": false,
                "error": "Web search not configured.",
                "disclaimer": WEB_DISCLAIMER,
            })
            .to_string());
        }

        let mut hits: Vec<WebHit> = Vec::new();
        let mut ai_answer: Option<String> = None;
        let mut provider = "";

        if let Some(key) = &self.tavily_key {
            match self.search_tavily(query, num_results, key).await {
                Ok(data) => {
                    ai_answer = data
                        .get("answer")
                        .and_then(|a| a.as_str())
                        .map(str::to_string);
                    hits = tavily_hits(&data);
                    provider = "tavily";
                }
                Err(e) => warn!(error = %e, "Tavily failed, trying Brave"),
            }
        }

        if hits.is_empty() {
            if let Some(key) = &self.brave_key {
                match self.search_brave(query, num_results, key).await {
                    Ok(data) => {
                        hits = brave_hits(&data);
                        provider = "brave";
                    }
                    Err(e) => {
                        warn!(error = %e, "Brave search failed");
                        return Ok(json!({
                            "success": false,
                            "error": format!("Web search failed: {e}"),
                            "disclaimer": WEB_DISCLAIMER,
                        })
                        .to_string());
                    }
                }
            }
        }

        if hits.is_empty() {
            return Ok(json!({
                "success": true,
                "content": format!("No relevant web results found for this query.{WEB_DISCLAIMER}"),
                "sources": [],
                "disclaimer": WEB_DISCLAIMER,
            })
            .to_string());
        }

        let mut formatted = Vec::new();
        if let Some(answer) = &ai_answer {
            formatted.push(format!("**Summary:** {answer}\n"));
        }
        let mut sources = Vec::new();
        for (i, hit) in hits.iter().take(num_results as usize).enumerate() {
            let snippet: String = hit.content.chars().take(300).collect();
            formatted.push(format!(
                "[{}] **{}**\n   {}...\n   Source: {}",
                i + 1,
                hit.title,
                snippet,
                hit.url
            ));
            sources.push(json!({
                "id": i + 1,
                "title": hit.title,
                "url": hit.url,
                "content": hit.content.chars().take(200).collect::<String>(),
                "verified": false,
            }));
        }

        info!(provider, count = sources.len(), "web search completed");
        Ok(json!({
            "success": true,
            "content": format!("{}{}", formatted.join("\n\n"), WEB_DISCLAIMER),
            "sources": sources,
            "source_type": "web_search",
            "provider": provider,
            "disclaimer": WEB_DISCLAIMER,
            "query": query,
        })
        .to_string())
    }
}

//! Team member lookup over the loaded directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Tool, ToolSourceError, ToolSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
    pub department: String,
    pub email: String,
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// In-process team directory, loaded once at startup.
pub struct TeamDirectory {
    members: Vec<TeamMember>,
}

impl TeamDirectory {
    pub fn new(members: Vec<TeamMember>) -> Self {
        Self { members }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn with_defaults() -> Self {
        let member = |name: &str, role: &str, department: &str, email: &str, expertise: &[&str]| {
            TeamMember {
                name: name.to_string(),
                role: role.to_string(),
                department: department.to_string(),
                email: email.to_string(),
                expertise: expertise.iter().map(|s| s.to_string()).collect(),
            }
        };
        Self::new(vec![
            member("Dewi Lestari", "CEO", "Management", "dewi@nusaatlas.com", &["strategy"]),
            member(
                "Raka Wiratama",
                "Head of Engineering",
                "Technology",
                "raka@nusaatlas.com",
                &["platform", "ai"],
            ),
            member(
                "Marta Kovalenko",
                "Visa Specialist",
                "Immigration",
                "marta@nusaatlas.com",
                &["visa", "kitas", "immigration"],
            ),
            member(
                "Putu Mahendra",
                "Tax Consultant",
                "Tax",
                "putu@nusaatlas.com",
                &["tax", "pph", "ppn"],
            ),
            member(
                "Giulia Ferrero",
                "Legal Counsel",
                "Legal",
                "giulia@nusaatlas.com",
                &["legal", "contracts", "pt pma"],
            ),
        ])
    }

    pub fn all(&self) -> &[TeamMember] {
        &self.members
    }

    fn matches(&self, predicate: impl Fn(&TeamMember) -> bool) -> Vec<&TeamMember> {
        self.members.iter().filter(|m| predicate(m)).collect()
    }
}

pub struct TeamKnowledgeTool {
    directory: Arc<TeamDirectory>,
}

impl TeamKnowledgeTool {
    pub fn new(directory: Arc<TeamDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for TeamKnowledgeTool {
    fn name(&self) -> &str {
        "team_knowledge"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "team_knowledge".to_string(),
            description: Some(
                "Get information about team members, their roles, departments, and contact info."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query_type": {
                        "type": "string",
                        "enum": ["list_all", "search_by_role", "search_by_name", "search_by_email"],
                        "description": "Type of query to perform"
                    },
                    "search_term": {
                        "type": "string",
                        "description": "Term to search for (name, role, or email)"
                    }
                },
                "required": ["query_type"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let query_type = args
            .get("query_type")
            .and_then(|v| v.as_str())
            .unwrap_or("list_all");
        let term = args
            .get("search_term")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if query_type == "list_all" {
            let listing: Vec<_> = self
                .directory
                .all()
                .iter()
                .map(|m| json!({"name": m.name, "role": m.role, "department": m.department}))
                .collect();
            return Ok(json!(listing).to_string());
        }

        if term.is_empty() {
            return Ok(json!({"error": "search_term is required for this query_type"}).to_string());
        }

        let matches = match query_type {
            "search_by_role" => self.directory.matches(|m| {
                m.role.to_lowercase().contains(&term)
                    || m.department.to_lowercase().contains(&term)
                    || m.expertise.iter().any(|e| e.to_lowercase().contains(&term))
            }),
            "search_by_name" => self
                .directory
                .matches(|m| m.name.to_lowercase().contains(&term)),
            "search_by_email" => self
                .directory
                .matches(|m| m.email.to_lowercase() == term),
            other => {
                return Ok(json!({"error": format!("unknown query_type: {other}")}).to_string());
            }
        };

        Ok(json!({"matches": matches, "count": matches.len()}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> TeamKnowledgeTool {
        TeamKnowledgeTool::new(Arc::new(TeamDirectory::with_defaults()))
    }

    #[tokio::test]
    async fn list_all_returns_names_and_roles() {
        let out = tool().call(json!({"query_type": "list_all"})).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let listing = parsed.as_array().unwrap();
        assert_eq!(listing.len(), 5);
        assert!(listing.iter().any(|m| m["role"] == "CEO"));
    }

    #[tokio::test]
    async fn search_by_role_matches_expertise() {
        let out = tool()
            .call(json!({"query_type": "search_by_role", "search_term": "visa"}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["matches"][0]["name"], "Marta Kovalenko");
    }

    #[tokio::test]
    async fn search_by_email_is_exact() {
        let out = tool()
            .call(json!({"query_type": "search_by_email", "search_term": "putu@nusaatlas.com"}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["count"], 1);

        let out = tool()
            .call(json!({"query_type": "search_by_email", "search_term": "putu@"}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["count"], 0);
    }

    #[tokio::test]
    async fn missing_term_is_in_band_error() {
        let out = tool()
            .call(json!({"query_type": "search_by_name"}))
            .await
            .unwrap();
        assert!(out.contains("search_term is required"));
    }
}

//! Official service pricing lookup over a curated in-process store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Tool, ToolSourceError, ToolSpec};

/// One curated price entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceRecord {
    pub service_type: String,
    pub service: String,
    pub price_idr: u64,
    pub notes: String,
}

/// Curated pricing table. Loaded once at startup; lookup only.
pub struct PricingStore {
    records: Vec<PriceRecord>,
}

impl PricingStore {
    pub fn new(records: Vec<PriceRecord>) -> Self {
        Self { records }
    }

    /// Parses the curated table from JSON (the shape the ops team exports).
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    /// Built-in table used when no export is supplied.
    pub fn with_defaults() -> Self {
        let record = |service_type: &str, service: &str, price_idr: u64, notes: &str| PriceRecord {
            service_type: service_type.to_string(),
            service: service.to_string(),
            price_idr,
            notes: notes.to_string(),
        };
        Self::new(vec![
            record("visa", "C1 Tourism Visa (60 days)", 2_300_000, "Single entry, extendable"),
            record("visa", "C2 Business Visa (60 days)", 3_600_000, "Single entry, extendable"),
            record("kitas", "E23 Working KITAS (1 year)", 17_500_000, "Includes RPTKA handling"),
            record("kitas", "E28A Investor KITAS (2 years)", 21_000_000, "Requires shares in a PT PMA"),
            record("kitas", "E33G Remote Worker KITAS (1 year)", 14_500_000, "Proof of foreign income required"),
            record("business_setup", "PT PMA Incorporation", 35_000_000, "Deed, approval, NIB, OSS"),
            record("business_setup", "CV Establishment", 12_000_000, "Local partnership entity"),
            record("tax_consulting", "Monthly Tax Compliance", 3_500_000, "PPh + PPN filings, per month"),
            record("tax_consulting", "Annual SPT Filing", 7_500_000, "Corporate annual return"),
            record("legal", "Commercial Contract Drafting", 9_000_000, "Bilingual, up to 15 pages"),
        ])
    }

    pub fn by_type(&self, service_type: &str) -> Vec<&PriceRecord> {
        if service_type.eq_ignore_ascii_case("all") {
            return self.records.iter().collect();
        }
        self.records
            .iter()
            .filter(|r| r.service_type.eq_ignore_ascii_case(service_type))
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<&PriceRecord> {
        let q = query.to_lowercase();
        self.records
            .iter()
            .filter(|r| {
                r.service.to_lowercase().contains(&q)
                    || r.notes.to_lowercase().contains(&q)
                    || r.service_type.to_lowercase().contains(&q)
            })
            .collect()
    }
}

pub struct PricingLookupTool {
    store: Arc<PricingStore>,
}

impl PricingLookupTool {
    pub fn new(store: Arc<PricingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PricingLookupTool {
    fn name(&self) -> &str {
        "pricing_lookup"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "pricing_lookup".to_string(),
            description: Some(
                "Get official service pricing. Use this for any price/cost question. \
                 Returns current prices from the curated pricing table."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "service_type": {
                        "type": "string",
                        "enum": ["visa", "kitas", "business_setup", "tax_consulting", "legal", "all"],
                        "description": "Category of service"
                    },
                    "query": {
                        "type": "string",
                        "description": "Specific service to search for"
                    }
                },
                "required": ["service_type"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let service_type = args
            .get("service_type")
            .and_then(|v| v.as_str())
            .unwrap_or("all");
        let query = args.get("query").and_then(|v| v.as_str());

        let records = match query {
            Some(q) if !q.trim().is_empty() => self.store.search(q),
            _ => self.store.by_type(service_type),
        };

        if records.is_empty() {
            return Ok(json!({
                "matches": [],
                "note": "No pricing entry found; confirm the exact service with the team."
            })
            .to_string());
        }

        let matches: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "service": r.service,
                    "service_type": r.service_type,
                    "price_idr": r.price_idr,
                    "notes": r.notes,
                })
            })
            .collect();
        Ok(json!({"matches": matches, "count": matches.len()}).to_string())
    }
}

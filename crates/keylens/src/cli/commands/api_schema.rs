use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Value, json};

use crate::server::{ASK_ROUTE, AskReply, AskRequestBody, BlockedReply, ErrorReply};

#[derive(Debug, Clone, Args)]
pub struct ApiSchemaArgs {}

#[must_use]
pub fn api_schema_document() -> Value {
    json!({
        "route": ASK_ROUTE,
        "method": "POST",
        "request": schemars::schema_for!(AskRequestBody),
        "responses": {
            "200": schemars::schema_for!(AskReply),
            "400": schemars::schema_for!(BlockedReply),
            "500": schemars::schema_for!(ErrorReply),
        }
    })
}

pub fn run(_args: &ApiSchemaArgs) -> Result<()> {
    let encoded = serde_json::to_string_pretty(&api_schema_document())
        .context("failed to encode api schema")?;
    println!("{encoded}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::api_schema_document;

    #[test]
    fn document_describes_the_ask_route() {
        let document = api_schema_document();
        assert_eq!(document["route"], "/ai/ask");
        assert_eq!(document["method"], "POST");

        let properties = document["request"]["properties"]
            .as_object()
            .expect("request schema should list properties");
        for field in ["user_question", "sql", "rows", "columns", "model", "prompt_strategy"] {
            assert!(properties.contains_key(field), "missing request field {field}");
        }
        assert!(document["responses"]["200"]["properties"]["row_count"].is_object());
        assert!(document["responses"]["500"]["properties"]["reply"].is_object());
    }
}

//! CLI handlers for endpoint calls.

use serde_json::Value;

use crate::client::ApiClient;
use crate::endpoint::EndpointRegistry;

/// Handle `storedesk endpoints`.
pub fn handle_endpoints(registry: &EndpointRegistry) {
    for def in registry.iter() {
        let tags = if def.provides.is_empty() {
            def.invalidates.len()
        } else {
            def.provides.len()
        };
        println!(
            "{:<24} {:<9} {:<7} {} ({tags} tag rules)",
            def.name, def.kind, def.method, def.path
        );
    }
}

/// Handle `storedesk get`.
pub async fn handle_get(
    client: &ApiClient,
    endpoint: &str,
    args: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = client.query(endpoint, parse_args(args)?).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

/// Handle `storedesk call`.
pub async fn handle_call(
    client: &ApiClient,
    endpoint: &str,
    args: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = client.mutate(endpoint, parse_args(args)?).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn parse_args(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err("--args must be a JSON object".into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_must_be_an_object() {
        assert!(parse_args(r#"{"id":"A"}"#).is_ok());
        assert!(parse_args("[1,2]").is_err());
        assert!(parse_args("not json").is_err());
    }
}

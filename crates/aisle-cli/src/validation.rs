use anyhow::{bail, Result};

use crate::Cli;

/// Rejects settings that would only fail later, at request time.
pub fn validate_cli(cli: &Cli) -> Result<()> {
    if !is_configured(cli.openai_api_key.as_deref()) {
        bail!("OPENAI_API_KEY is required (set it or pass --openai-api-key)");
    }
    if cli.max_turns == 0 {
        bail!("--max-turns must be greater than 0");
    }
    if !(0.0..=2.0).contains(&cli.temperature) {
        bail!(
            "--temperature must be within 0.0..=2.0 (got {})",
            cli.temperature
        );
    }
    if cli.max_tokens == 0 {
        bail!("--max-tokens must be greater than 0");
    }
    if is_configured(cli.moments_api_endpoint.as_deref())
        && !is_configured(cli.moments_engine_id.as_deref())
    {
        bail!("MOMENTS_ENGINE_ID is required when MOMENTS_API_ENDPOINT is set");
    }
    Ok(())
}

/// Set and not blank; a blank value counts as missing everywhere.
pub(crate) fn is_configured(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

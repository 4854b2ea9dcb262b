use std::env;

use tracing::debug;

use nftower_core::error::{Result, ResultExt};

use crate::aws::{require_output, StackOutputs};
use crate::client::ENDPOINT_ENV;

/// Where the Tower API base URL is looked up, in order.
#[derive(Debug, Clone)]
pub struct EndpointSource<'a> {
    /// Value from the CLI or the settings file.
    pub configured: Option<&'a str>,
    /// Stack exporting the DNS record of the Tower deployment.
    pub route53_stack: &'a str,
    pub route53_output: &'a str,
}

/// Resolve the API endpoint: explicit value, then `TOWER_API_ENDPOINT`, then
/// `https://<record>/api` from the Route 53 stack output.
pub fn resolve_api_endpoint(source: &EndpointSource<'_>, stacks: &dyn StackOutputs) -> Result<String> {
    if let Some(endpoint) = source.configured.filter(|e| !e.trim().is_empty()) {
        return Ok(endpoint.to_string());
    }
    if let Ok(endpoint) = env::var(ENDPOINT_ENV) {
        if !endpoint.trim().is_empty() {
            debug!("Using Tower API endpoint from {ENDPOINT_ENV}");
            return Ok(endpoint);
        }
    }

    let outputs = stacks
        .get_stack_outputs(source.route53_stack)
        .scope("resolving the Tower API endpoint")?;
    let hostname = require_output(&outputs, source.route53_output)?;
    let endpoint = format!("https://{}/api", hostname.trim_end_matches('.'));
    debug!("Using Tower API endpoint from stack {}: {}", source.route53_stack, endpoint);
    Ok(endpoint)
}

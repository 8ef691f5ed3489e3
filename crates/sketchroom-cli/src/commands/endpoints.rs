//! Endpoints command handler

use anyhow::Result;

use sketchroom_core::{Config, EndpointSelector};

use crate::output::Output;

/// List relay endpoints in the order connection attempts use them
pub fn list(config: &Config, output: &Output) -> Result<()> {
    let selector = EndpointSelector::new(config.endpoints.clone());
    output.print_endpoints(selector.candidates(), config.endpoint_override.as_ref());
    Ok(())
}

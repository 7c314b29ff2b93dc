use anyhow::Result;

use crate::cli::OutputFormat;
use crate::client::AdminClient;
use crate::output::print_value;

pub async fn list(
    client: &AdminClient,
    resource_type: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let states = client.list(resource_type).await?;
    print_value(&states, format);
    Ok(())
}

pub async fn get(
    client: &AdminClient,
    resource_type: &str,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let state = client.get(resource_type, name).await?;
    print_value(&state, format);
    Ok(())
}

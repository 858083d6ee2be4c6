//! Status command: query `GET /`

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use tracing::info;

use crate::client::KilnClient;
use crate::commands::Command;
use crate::config::Config;
use crate::utils::print_output;

#[derive(Args, Debug)]
pub struct StatusCommand {}

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        let client = KilnClient::new(config.base_url());
        info!("Checking server status at {}", client.base_url());

        let status = client.status().await?;
        if !json_output {
            println!("{} {}", style("Server:").bold(), client.base_url());
        }
        print_output(&status, json_output)
    }
}

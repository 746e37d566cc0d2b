//! Querying a running glove agent

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_readiness, color_status, print_json, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show agent health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("Health:     {}", color_status(health.status));
            println!("Readiness:  {}", color_readiness(readiness.ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:     {}", reason);
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    component: name.to_string(),
                    status: color_status(component.status),
                    since: component.since.format("%Y-%m-%d %H:%M:%S").to_string(),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show the newest gesture the agent classified
pub async fn show_gesture(client: &ApiClient, format: OutputFormat) -> Result<()> {
    match client.latest_gesture().await? {
        Some(reading) => match format {
            OutputFormat::Json => print_json(&reading),
            OutputFormat::Table => {
                println!("Gesture:   {}", reading.gesture.bold().green());
                println!("Index:     {}", reading.gesture_index);
                println!("Sequence:  {}", reading.sequence);
                println!("At:        {}", reading.timestamp.to_rfc3339());
            }
        },
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Table => print_warning("The agent has not classified a gesture yet"),
        },
    }

    Ok(())
}

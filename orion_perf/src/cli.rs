use std::{fs, path::Path};

use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use env_logger::Env;
use log::{info, Level};

use crate::charts::html::write_report;
use crate::config::{read_settings, Settings};
use crate::tools::{ToolOutput, ToolResponse, Tools};
use orion_perf_cli_types::{Cli, CliWindow, Commands};

pub async fn handle_calls() -> Result<()> {
    let cli = Cli::parse();
    let logger_level = match cli.verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(logger_level.as_str())).init();

    let settings = read_settings(cli.config_file.as_deref())?;
    let tools = Tools::from_settings(settings);
    let (version, lookback) = match &cli.command {
        Commands::DetailedPerformance { window }
        | Commands::HasRegressed { window }
        | Commands::MetricsCorrelation { window, .. }
        | Commands::PrPerformance { window, .. } => resolve_window(tools.settings(), window),
        Commands::PerformanceTrend { lookback, .. } => (
            tools.settings().default_version.clone(),
            lookback.lookback.unwrap_or(tools.settings().default_lookback),
        ),
        _ => (
            tools.settings().default_version.clone(),
            tools.settings().default_lookback,
        ),
    };

    let output = match cli.command {
        Commands::DataSource {} => tools.data_source()?,
        Commands::ListConfigs {} => tools.list_configs(),
        Commands::ListMetrics {} => tools.list_metrics().await?,
        Commands::DetailedPerformance { .. } => {
            tools.detailed_performance(&version, lookback).await?
        }
        Commands::HasRegressed { .. } => tools.has_regressed(&version, lookback).await?,
        Commands::PerformanceTrend {
            versions,
            metric,
            config,
            ..
        } => {
            tools
                .performance_trend(&versions, &metric, &config, lookback)
                .await?
        }
        Commands::MetricsCorrelation {
            metric1,
            metric2,
            config,
            ..
        } => {
            tools
                .metrics_correlation(&metric1, &metric2, &config, &version, lookback)
                .await?
        }
        Commands::PrPerformance {
            organization,
            repository,
            pull_request,
            config,
            ..
        } => {
            tools
                .pr_performance(
                    &organization,
                    &repository,
                    pull_request,
                    &config,
                    &version,
                    lookback,
                )
                .await?
        }
        Commands::Config {} => {
            print!("{}", show_settings(tools.settings())?);
            return Ok(());
        }
    };

    if let Some(dir) = &cli.output_dir {
        write_images(&output.responses, dir)?;
    }

    if let Some(path) = &cli.html {
        write_report(&output.charts, "orion-perf report", path)?;
        info!("Wrote {} charts to {}", output.charts.len(), path.display());
    }

    println!("{}", render_output(&output, cli.json)?);
    Ok(())
}

fn resolve_window(settings: &Settings, window: &CliWindow) -> (String, u32) {
    (
        window
            .version
            .clone()
            .unwrap_or_else(|| settings.default_version.clone()),
        window.lookback.lookback.unwrap_or(settings.default_lookback),
    )
}

fn show_settings(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize settings")
}

fn render_output(output: &ToolOutput, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(&output.responses)
            .context("Failed to serialize responses");
    }

    Ok(output
        .responses
        .iter()
        .map(|response| match response {
            ToolResponse::Text { value } => value.clone(),
            ToolResponse::Image { data, mime_type } => format!("data:{mime_type};base64,{data}"),
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Decode every image response into `dir/chart-<n>.png`, numbered from 1.
fn write_images(responses: &[ToolResponse], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let images = responses.iter().filter_map(|response| match response {
        ToolResponse::Image { data, .. } => Some(data),
        ToolResponse::Text { .. } => None,
    });

    for (n, data) in images.enumerate() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .context("Image response is not valid base64")?;
        let path = dir.join(format!("chart-{}.png", n + 1));
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use orion_perf_cli_types::CliLookback;

    fn output(responses: Vec<ToolResponse>) -> ToolOutput {
        ToolOutput {
            responses,
            charts: Vec::new(),
        }
    }

    #[test]
    fn window_defaults_from_settings() {
        let settings = Settings::default();
        let window = CliWindow {
            version: None,
            lookback: CliLookback { lookback: None },
        };
        assert_eq!(resolve_window(&settings, &window), ("4.19".to_string(), 15));

        let window = CliWindow {
            version: Some("4.18".to_string()),
            lookback: CliLookback { lookback: Some(30) },
        };
        assert_eq!(resolve_window(&settings, &window), ("4.18".to_string(), 30));
    }

    #[test]
    fn plain_rendering() {
        let rendered = render_output(
            &output(vec![
                ToolResponse::text("report"),
                ToolResponse::Image {
                    data: "aGk=".to_string(),
                    mime_type: "image/png".to_string(),
                },
            ]),
            false,
        )
        .unwrap();
        assert_eq!(rendered, "report\ndata:image/png;base64,aGk=");
    }

    #[test]
    fn json_rendering() {
        let rendered = render_output(&output(vec![ToolResponse::text("report")]), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value, serde_json::json!([{"type": "text", "value": "report"}]));
    }

    #[test]
    fn images_are_decoded_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("charts");
        write_images(
            &[
                ToolResponse::text("ignored"),
                ToolResponse::Image {
                    data: "aGk=".to_string(),
                    mime_type: "image/png".to_string(),
                },
            ],
            &target,
        )
        .unwrap();
        assert_eq!(fs::read(target.join("chart-1.png")).unwrap(), b"hi");
        assert!(!target.join("chart-2.png").exists());

        let invalid = write_images(
            &[ToolResponse::Image {
                data: "***".to_string(),
                mime_type: "image/png".to_string(),
            }],
            &target,
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn settings_are_shown_as_toml() {
        let shown = show_settings(&Settings::default()).unwrap();
        assert!(shown.contains("orion_binary = \"orion\""));
        assert!(shown.contains("changepoint_exit_code = 3"));
        assert!(!shown.contains("data_source"));
    }
}

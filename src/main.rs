use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use findingchart::chart::{ChartRequest, OutputMode};
use findingchart::cli::{Cli, Commands};
use findingchart::commands::generate_chart_file;
use findingchart::coordinates::CoordinateFormat;
use findingchart::server::{run_server, state::AppState};
use findingchart::survey::{ArchiveConfig, DssArchive, Survey};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs on stderr so JSON output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let archive = ArchiveConfig {
        url: cli.archive_url.clone(),
        timeout: Duration::from_secs(cli.fetch_timeout),
    };

    match cli.command {
        Commands::Chart {
            out_year,
            ra,
            dec,
            epoch,
            pmra,
            pmdec,
            width,
            height,
            survey,
            output,
            mode,
            format,
            fits,
            render,
        } => {
            let survey: Survey = survey
                .parse()
                .with_context(|| format!("Invalid survey: {}", survey))?;
            let mode: OutputMode = mode
                .parse()
                .with_context(|| format!("Invalid output mode: {}", mode))?;
            let format: CoordinateFormat = format
                .parse()
                .with_context(|| format!("Invalid coordinate format: {}", format))?;

            let request = ChartRequest {
                out_epoch: out_year,
                ra,
                dec,
                format,
                epoch,
                pm_ra: pmra,
                pm_dec: pmdec,
                width_arcmin: width,
                height_arcmin: height,
                survey,
            };
            let mut config = render.to_chart_config();
            config.mode = mode;

            generate_chart_file(
                &request,
                &config,
                archive,
                fits,
                output,
                &mut std::io::stdout().lock(),
            )?;
        }
        Commands::Serve {
            host,
            port,
            static_dir,
            render,
        } => {
            let state = AppState::new(
                render.to_chart_config(),
                Arc::new(DssArchive::new(archive)),
            );
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_server(state, host, port, static_dir))?;
        }
    }

    Ok(())
}

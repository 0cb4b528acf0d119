use std::process;

use anyhow::Context;

use format_xml::cli::Cli;
use format_xml::config::ConfigManager;
use format_xml::engine::FormatEngine;
use format_xml::file_discovery::FileDiscovery;
use format_xml::output::Output;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            2
        }
    };
    process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse_args();
    if let Err(message) = cli.validate() {
        anyhow::bail!(message);
    }

    let config = ConfigManager::load_config(&cli)
        .await
        .context("failed to load configuration")?;

    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?;

    let engine = FormatEngine::from_app_config(&config);
    let results = engine
        .run(&cli.path, &discovery)
        .await
        .with_context(|| format!("failed to process {}", cli.path.display()))?;

    let output = Output::new(config.output.verbosity());
    print!("{}", output.format_results(&results));

    Ok(if results.has_failures() { 1 } else { 0 })
}

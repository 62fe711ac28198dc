//! Firefly CLI - concurrent image generation from the command line.
//!
//! Run `firefly --help` for usage information.

use anyhow::{Context, Result};
use console::style;
use firefly_api::{
    Args, BatchReport, BatchRunner, Config, FireflyClient, GenerationRequest, GlyphOptions,
    ImageOptions, OptionCatalog,
};
use std::path::Path;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse_args();

    // Setup logging
    setup_logging(&args);

    // Print banner
    if !args.json_logs {
        print_banner();
    }

    // Load configuration
    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => fail(&format!("Configuration error: {e}")),
    };

    let listing = args.list_styles || args.list_presets;
    if !listing && args.prompts.is_empty() && args.glyph.is_none() {
        fail("Nothing to generate: pass --prompt and/or --glyph");
    }
    if args.count == 0 {
        fail("--count must be at least 1");
    }

    // Dry run mode
    if args.dry_run {
        println!("\n{}", style("DRY RUN MODE").yellow().bold());
        println!("Configuration validated successfully.\n");
        print_config_summary(&args, &config);
        return Ok(());
    }

    let Some(token) = args.token.clone() else {
        fail("No bearer token: pass --token or set FIREFLY_TOKEN");
    };

    // Verbose configuration summary
    if args.verbose && !args.json_logs {
        print_config_summary(&args, &config);
    }

    let jobs = build_jobs(&args).await?;

    let client = match FireflyClient::connect(token, config).await {
        Ok(c) => c,
        Err(e) => fail(&format!("Failed to connect: {e}")),
    };

    if listing {
        if args.list_styles {
            print_styles(client.catalog());
        }
        if args.list_presets {
            print_presets(client.catalog());
        }
        return Ok(());
    }

    info!(
        jobs = jobs.len(),
        output_dir = %args.output_dir.display(),
        "Starting generation"
    );

    let runner = BatchRunner::new(client).with_progress(!args.no_progress && !args.json_logs);
    let report = runner.run(jobs).await;

    let written = save_images(&report, &args.output_dir).await?;

    // Print results
    if !args.json_logs {
        report.print_summary();

        if written > 0 {
            println!(
                "\n{} {} image(s) saved to: {}",
                style("✓").green().bold(),
                written,
                args.output_dir.display()
            );
        }

        for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
            if let Err(e) = &outcome.result {
                println!(
                    "{} #{} {}: {}",
                    style("⚠").yellow().bold(),
                    outcome.index,
                    outcome.input,
                    e
                );
            }
        }
    } else {
        // JSON output for programmatic consumption
        let failures: Vec<_> = report
            .outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().err().map(|e| {
                    serde_json::json!({
                        "index": o.index,
                        "input": o.input,
                        "error": e.to_string(),
                        "status": e.status(),
                    })
                })
            })
            .collect();
        let json_result = serde_json::json!({
            "status": "complete",
            "jobs": report.outcomes.len(),
            "success_count": report.success_count(),
            "failure_count": report.failure_count(),
            "success_rate": report.success_rate(),
            "elapsed_seconds": report.elapsed.as_secs_f64(),
            "avg_latency_ms": report.stats.avg_latency_ms,
            "output_dir": args.output_dir,
            "failures": failures,
        });
        println!("{}", serde_json::to_string(&json_result)?);
    }

    // Exit with error code if nothing succeeded
    if report.failure_count() > 0 && report.success_count() == 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn fail(message: &str) -> ! {
    error!("{}", message);
    eprintln!("{} {}", style("Error:").red().bold(), message);
    std::process::exit(1);
}

/// Expand prompts and the glyph into `count` jobs each.
async fn build_jobs(args: &Args) -> Result<Vec<GenerationRequest>> {
    let mut image_options = ImageOptions::new().with_styles(args.styles.iter().cloned());
    image_options.aspect_ratio = args.aspect_ratio;
    image_options.steps = args.steps;
    image_options.seed = args.seed;
    image_options.style_prompt = args.style_prompt.clone();
    image_options.anchor_prompt = args.anchor_prompt.clone();

    let mut jobs = Vec::new();
    for prompt in &args.prompts {
        for _ in 0..args.count {
            jobs.push(GenerationRequest::text(prompt.clone(), image_options.clone()));
        }
    }

    if let Some(path) = &args.glyph {
        let glyph = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read glyph image '{}'", path.display()))?;

        let mut glyph_options = GlyphOptions::new();
        glyph_options.presets = args.presets.clone();
        glyph_options.prompt = args.effect.clone();
        glyph_options.fit = args.fit.unwrap_or_default();
        glyph_options.steps = args.steps;
        glyph_options.seed = args.seed;

        for _ in 0..args.count {
            jobs.push(GenerationRequest::glyph(glyph.clone(), glyph_options.clone()));
        }
    }

    Ok(jobs)
}

/// Write every successful image as `<index>.<extension>`.
async fn save_images(report: &BatchReport, dir: &Path) -> Result<usize> {
    if report.success_count() == 0 {
        return Ok(0);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;

    let mut written = 0;
    for (index, image) in report.images() {
        let path = dir.join(image.file_name(&index.to_string()));
        tokio::fs::write(&path, &image.data)
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        written += 1;
    }

    Ok(written)
}

fn setup_logging(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("firefly_api={level},firefly={level}")));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn print_banner() {
    let banner = r#"
    _______           ______
   / ____(_)_______  / __/ /_  __
  / /_  / / ___/ _ \/ /_/ / / / /
 / __/ / / /  /  __/ __/ / /_/ /
/_/   /_/_/   \___/_/ /_/\__, /
                        /____/
    "#;

    println!("{}", style(banner).yellow().bold());
    println!(
        "    {}",
        style("Concurrent Image Generation Client").white().dim()
    );
    println!(
        "    {}",
        style(format!("v{}", firefly_api::VERSION)).white().dim()
    );
    println!();
}

fn print_config_summary(args: &Args, config: &Config) {
    println!("{}", style("Configuration:").bold());
    println!("  Build:      {:?}", config.service.build);
    println!("  Service:    {}", config.service.base_url());
    println!("  Assets:     {}", config.service.asset_base_url());
    println!("  Prompts:    {} x {}", args.prompts.len(), args.count);
    if let Some(glyph) = &args.glyph {
        println!("  Glyph:      {} x {}", glyph.display(), args.count);
    }
    if !args.styles.is_empty() {
        println!("  Styles:     {}", args.styles.join(", "));
    }
    if !args.presets.is_empty() {
        println!("  Presets:    {}", args.presets.join(", "));
    }
    println!("  Output:     {}", args.output_dir.display());
    println!("  Workers:    {}", config.request.workers);
    match config.rate_limit_nonzero() {
        Some(rate) => println!("  Rate Limit: {rate} req/sec"),
        None => println!("  Rate Limit: unpaced"),
    }
    println!("  Timeout:    {:?}", config.request.timeout);
    println!();
}

fn print_styles(catalog: &OptionCatalog) {
    println!("{}", style("Image styles:").bold());
    for group in catalog.groups() {
        println!("  {}", style(group).cyan());
        for s in catalog.styles_in_group(group) {
            println!("    {} ({})", s.title, s.id);
        }
    }
    let ungrouped: Vec<_> = catalog.styles_in_group("").collect();
    if !ungrouped.is_empty() {
        println!("  {}", style("Other").cyan());
        for s in ungrouped {
            println!("    {} ({})", s.title, s.id);
        }
    }
    println!();
}

fn print_presets(catalog: &OptionCatalog) {
    println!("{}", style("Text-effect presets:").bold());
    for p in &catalog.text_presets {
        println!("  {} ({})", p.title, p.id);
    }
    if !catalog.text_fonts.is_empty() {
        println!("{}", style("Fonts:").bold());
        for f in &catalog.text_fonts {
            println!("  {} ({})", f.title, f.id);
        }
    }
    println!();
}

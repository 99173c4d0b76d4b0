use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use abacus_counter::cli::{Args, Command, ServeArgs, SpriteArgs};
use abacus_counter::image_processing::{LabelRenderer, SpriteBatch, SpriteBatchConfig, SpriteBuilder};
use abacus_counter::utils::{
    create_progress_bar, format_duration, validate_sprite_inputs, verbose_println, warn_println,
};
use abacus_counter::{init_tracing, server, CountingService, GeminiClient};

fn main() -> Result<()> {
    // .env must be loaded before clap reads env-backed flags
    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    let mut args = Args::parse();
    init_tracing(args.verbose);
    args.load_and_merge_config()?;

    // Print banner
    println!("{}", style("Abacus Counter").bold().blue());
    println!("{}", style("Counting abacus reader").dim());
    println!();

    match &args.command {
        Command::Serve(serve) => run_serve(serve, args.verbose),
        Command::Sprite(sprite) => run_sprite(sprite, args.verbose),
    }
}

fn run_serve(args: &ServeArgs, verbose: bool) -> Result<()> {
    let config = args.app_config();
    config.validate()?;

    if verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Model: {}", config.model);
        println!("  API base: {}", config.api_base);
        println!("  Listen: {}:{}", config.host, config.port);
        println!("  Upload folder: {}", config.upload_dir.display());
        println!("  Model timeout: {}", format_duration(config.model_timeout));
        println!("  Upload limit: {} bytes", config.max_upload_bytes);
        println!("  Label font: {}", config.label_font);
        println!();
    }

    let labels = LabelRenderer::load(&config.label_font);
    if !labels.has_font() {
        warn!(
            "Font '{}' not found, row numbers use the built-in bitmap digits",
            config.label_font
        );
    }

    let model = GeminiClient::new(&config.api_key, &config.model, &config.api_base)
        .context("Failed to create model client")?;
    let service = Arc::new(CountingService::new(
        Arc::new(config),
        Arc::new(model),
        SpriteBuilder::new(labels),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(server::serve(service))
}

fn run_sprite(args: &SpriteArgs, verbose: bool) -> Result<()> {
    let start_time = Instant::now();
    validate_sprite_inputs(args)?;

    let labels = LabelRenderer::load(&args.font);
    if !labels.has_font() {
        warn_println(&format!(
            "Font '{}' not found, using built-in bitmap digits",
            args.font
        ));
    }

    let config = SpriteBatchConfig {
        extensions: args.extensions(),
        parallel_jobs: args.parallel_jobs(),
        verbose,
    };

    if verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Output directory: {}", args.output_dir.display());
        println!("  Parallel jobs: {}", config.parallel_jobs);
        println!("  Extensions: {:?}", config.extensions);
        println!("  Label font: {}", args.font);
        println!();
    }

    let batch = SpriteBatch::new(SpriteBuilder::new(labels), config)?;
    let image_files = batch.discover_images(&args.input_paths)?;

    if image_files.is_empty() {
        println!(
            "{}",
            style("No images found with specified extensions").red()
        );
        return Ok(());
    }

    let progress = create_progress_bar(image_files.len() as u64);
    let results = batch.render_all(&image_files, &args.output_dir, &progress);
    progress.finish_and_clear();

    let mut successful = 0;
    let mut failed = 0;
    let mut short_images = 0;

    println!("{}", style("Results Summary:").bold().green());
    for result in &results {
        match result {
            Ok(rendered) => {
                successful += 1;
                if rendered.margins_discarded {
                    short_images += 1;
                }
                verbose_println(
                    verbose,
                    &format!(
                        "{} -> {} ({})",
                        rendered.input_path.display(),
                        rendered.sprite_path.display(),
                        format_duration(rendered.processing_time)
                    ),
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {} {:#}", style("Failed:").red(), e);
            }
        }
    }

    println!("  Sprites written: {}", style(successful).bold().green());
    if failed > 0 {
        println!("  Failed: {}", style(failed).bold().red());
    }
    if short_images > 0 {
        println!(
            "  Margins discarded: {}",
            style(short_images).bold().yellow()
        );
    }

    println!();
    println!("{}", style("Performance:").bold().blue());
    println!("  Total time: {}", format_duration(start_time.elapsed()));

    if failed > 0 {
        return Err(anyhow::anyhow!("{} of {} images failed", failed, results.len()));
    }
    Ok(())
}

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

use crate::cli::SpriteArgs;

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file has one of the specified extensions
pub fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    if let Some(ext) = get_file_extension(path) {
        extensions.contains(&ext)
    } else {
        false
    }
}

/// Parse a comma-separated extension list ("jpg, .PNG") into lowercase names without dots
pub fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Reduce an uploaded filename to something safe to store on disk
///
/// Drops any directory part, transliterates accented letters through NFKD
/// (`contusão` -> `contusao`), keeps ASCII letters, digits, `.`, `-` and `_`,
/// turns whitespace runs into a single underscore and strips leading dots.
/// Returns an empty string when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let mut result = String::with_capacity(base.len());
    let mut prev_was_underscore = false;

    for ch in base.nfkd() {
        let mapped = match ch {
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' => Some(c),
            c if c == '_' || c.is_whitespace() => Some('_'),
            _ => None,
        };

        match mapped {
            Some('_') if prev_was_underscore => {}
            Some(c) => {
                prev_was_underscore = c == '_';
                result.push(c);
            }
            None => {}
        }
    }

    result.trim_start_matches(['.', '_']).trim_end_matches('_').to_string()
}

/// Validate the sprite command inputs and create the output directory
pub fn validate_sprite_inputs(args: &SpriteArgs) -> Result<()> {
    for input_path in &args.input_paths {
        if !input_path.exists() {
            return Err(anyhow::anyhow!(
                "Input path does not exist: {}",
                input_path.display()
            ));
        }
    }

    if args.extensions().is_empty() {
        return Err(anyhow::anyhow!("No image extensions given"));
    }

    if args.jobs > 32 {
        return Err(anyhow::anyhow!("Number of jobs should not exceed 32"));
    }

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            args.output_dir.display()
        )
    })?;

    Ok(())
}

/// Print verbose information if verbose mode is enabled
pub fn verbose_println(verbose: bool, message: &str) {
    if verbose {
        println!("{} {}", style("[VERBOSE]").dim(), message);
    }
}

/// Print warning message
pub fn warn_println(message: &str) {
    println!("{} {}", style("[WARNING]").yellow().bold(), message);
}

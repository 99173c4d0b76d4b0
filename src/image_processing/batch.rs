use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use super::sprite::{save_jpeg, SpriteBuilder};
use crate::utils::{format_duration, has_valid_extension, sanitize_filename, verbose_println};

/// Batch processing statistics and progress tracking
pub struct BatchProcessor {
    pub total_files: usize,
    pub processed_count: AtomicUsize,
    pub start_time: Instant,
}

impl BatchProcessor {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            processed_count: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Increment processed count and return current count
    pub fn increment(&self) -> usize {
        self.processed_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get current progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_files == 0 {
            1.0
        } else {
            (self.processed_count.load(Ordering::Relaxed) as f64) / (self.total_files as f64)
        }
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Option<Duration> {
        let processed = self.processed_count.load(Ordering::Relaxed);
        if processed == 0 {
            return None;
        }

        let remaining = self.total_files.saturating_sub(processed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }

        let time_per_item = self.start_time.elapsed() / processed as u32;
        Some(time_per_item * remaining as u32)
    }
}

#[derive(Debug, Clone)]
pub struct SpriteBatchConfig {
    pub extensions: Vec<String>,
    pub parallel_jobs: usize,
    pub verbose: bool,
}

/// Files written for one source photo
#[derive(Debug)]
pub struct RenderedSprite {
    pub input_path: PathBuf,
    pub sprite_path: PathBuf,
    pub crop_paths: Vec<PathBuf>,
    pub margins_discarded: bool,
    pub processing_time: Duration,
}

/// Renders sprites for a set of photos without calling the model
pub struct SpriteBatch {
    builder: SpriteBuilder,
    config: SpriteBatchConfig,
    pool: rayon::ThreadPool,
}

impl SpriteBatch {
    pub fn new(builder: SpriteBuilder, config: SpriteBatchConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_jobs)
            .build()
            .context("Failed to initialize thread pool")?;

        Ok(Self {
            builder,
            config,
            pool,
        })
    }

    /// Collect image files from the given files and directories, sorted
    pub fn discover_images(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input in inputs {
            verbose_println(self.config.verbose, &format!("Scanning: {}", input.display()));

            let walker = WalkDir::new(input).follow_links(false).max_depth(10);

            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        image_files.sort();
        image_files.dedup();

        verbose_println(
            self.config.verbose,
            &format!("Found {} image files", image_files.len()),
        );
        Ok(image_files)
    }

    /// Render every file in parallel, advancing `progress` once per file
    pub fn render_all(
        &self,
        image_files: &[PathBuf],
        output_dir: &Path,
        progress: &ProgressBar,
    ) -> Vec<Result<RenderedSprite>> {
        let tracker = BatchProcessor::new(image_files.len());
        let stems = unique_stems(image_files);

        self.pool.install(|| {
            image_files
                .par_iter()
                .zip(stems.par_iter())
                .map(|(path, stem)| {
                    let result = self
                        .render_as(path, output_dir, stem)
                        .with_context(|| format!("Failed to render {}", path.display()));

                    let done = tracker.increment();
                    progress.inc(1);
                    progress.set_message(format!(
                        "{}/{} ({:.0}%, ~{} left)",
                        done,
                        tracker.total_files,
                        tracker.progress() * 100.0,
                        tracker.eta().map(format_duration).unwrap_or_default()
                    ));

                    result
                })
                .collect()
        })
    }

    /// Build the sprite for one photo and write `<stem>_sprite.jpg` plus `<stem>_right_NN.jpg`
    pub fn render_one(&self, input_path: &Path, output_dir: &Path) -> Result<RenderedSprite> {
        self.render_as(input_path, output_dir, &output_stem(input_path))
    }

    fn render_as(&self, input_path: &Path, output_dir: &Path, stem: &str) -> Result<RenderedSprite> {
        let started = Instant::now();
        verbose_println(self.config.verbose, &format!("Processing: {}", input_path.display()));

        let img = image::open(input_path)
            .with_context(|| format!("Failed to open image: {}", input_path.display()))?
            .to_rgb8();

        let sprite = self.builder.build(&img)?;
        if sprite.geometry.margins_discarded {
            verbose_println(
                self.config.verbose,
                &format!("{}: image too short, margins discarded", input_path.display()),
            );
        }

        let sprite_path = output_dir.join(format!("{}_sprite.jpg", stem));
        save_jpeg(&sprite.image, &sprite_path)?;

        let mut crop_paths = Vec::with_capacity(sprite.tiles.len());
        for (i, tile) in sprite.tiles.iter().enumerate() {
            let crop_path = output_dir.join(format!("{}_right_{:02}.jpg", stem, i + 1));
            save_jpeg(tile, &crop_path)?;
            crop_paths.push(crop_path);
        }

        Ok(RenderedSprite {
            input_path: input_path.to_path_buf(),
            sprite_path,
            crop_paths,
            margins_discarded: sprite.geometry.margins_discarded,
            processing_time: started.elapsed(),
        })
    }
}

/// Output stems for a batch; repeated stems get `_2`, `_3`, ... in input order
fn unique_stems(image_files: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();

    image_files
        .iter()
        .map(|path| {
            let stem = output_stem(path);
            let mut candidate = stem.clone();
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = format!("{}_{}", stem, n);
                n += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn output_stem(input_path: &Path) -> String {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_filename)
        .unwrap_or_default();

    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

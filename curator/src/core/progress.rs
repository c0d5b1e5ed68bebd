use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::OnceLock;

static GLOBAL_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

const DEFAULT_TEMPLATE: &str = "[{job_name}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} ETA: {eta}";
const PROGRESS_CHARS: &str = "#>-";

pub fn init_global_progress() -> &'static MultiProgress {
    GLOBAL_PROGRESS.get_or_init(MultiProgress::new)
}

fn job_style(job_name: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&DEFAULT_TEMPLATE.replace("{job_name}", job_name))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

/// One bar per job phase, drawn under the shared `MultiProgress`.
#[derive(Clone)]
pub struct JobProgressBar {
    bar: ProgressBar,
    job_name: String,
}

impl JobProgressBar {
    pub fn init(&self, total: usize, unit: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_message(format!("Processing {}", unit));
    }

    pub fn increment(&self) {
        self.bar.inc(1);
    }

    pub fn set(&self, position: usize) {
        self.bar.set_position(position as u64);
    }

    pub fn done(&self, message: String) {
        self.bar.finish_with_message(format!("{} ✓", message));
        tracing::info!("[{}] {}", self.job_name, message);
    }
}

pub fn create_progress_with_job(job_name: &str, description: &str) -> JobProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(job_style(job_name));
    bar.set_message(description.to_owned());

    JobProgressBar {
        bar: init_global_progress().add(bar),
        job_name: job_name.to_owned(),
    }
}

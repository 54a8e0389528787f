use anyhow::{Context, Result};
use log::LevelFilter;
use tokio::runtime::Runtime;

use office_preview::{PreviewConfig, Previewer, BackendSet, HandlerRegistry};

/// Log to a file with `fern` when `OFFICE_PREVIEW_LOG_FILE` is set,
/// otherwise to stderr with `env_logger`.
fn init_logging() -> Result<()> {
    match std::env::var("OFFICE_PREVIEW_LOG_FILE") {
        Ok(path) if !path.is_empty() => {
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "[{} {} {}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .level(LevelFilter::Info)
                .chain(fern::log_file(&path).with_context(|| format!("Failed to open log file: {}", path))?)
                .apply()
                .context("Failed to install file logger")?;
        }
        _ => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: office_preview <file>...");
        std::process::exit(2);
    }

    let previewer = Previewer::new(PreviewConfig::from_env(), HandlerRegistry::with_defaults(), BackendSet::default());

    // Create a Tokio runtime for async operations
    let rt = Runtime::new()?;
    rt.block_on(async {
        for path in &paths {
            let preview = previewer
                .preview_file(path)
                .await
                .with_context(|| format!("Failed to read {}", path))?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

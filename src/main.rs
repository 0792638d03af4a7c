use std::env;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vgr::vgr_core::Color;
use vgr::{OutputFormat, load_document, render_pdf, render_png};

fn usage(program: &str) {
    eprintln!("Vector scene renderer");
    eprintln!("Usage: {} <scene.json> -o <output> [options]", program);
    eprintln!("\nOptions:");
    eprintln!("  -o <file>            Output file (.png or .pdf)");
    eprintln!("  --format <png|pdf>   Output format when the extension is ambiguous");
    eprintln!("  --page <n>           Render only page n (1-based, PNG only)");
    eprintln!("  --dpi <dpi>          Raster resolution (default 96)");
    eprintln!("  --background <color> Fill raster output with a colour first");
    eprintln!("  --stretch            Stretch pages to whole output units");
    eprintln!("  -v, --verbose        Debug logging");
}

/// Value following `flag`, if the flag is present.
fn option_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|arg| arg == flag) {
        Some(pos) => match args.get(pos + 1) {
            Some(value) => Ok(Some(value.as_str())),
            None => bail!("{} requires a value", flag),
        },
        None => Ok(None),
    }
}

fn run(args: &[String]) -> Result<()> {
    let scene_path = PathBuf::from(&args[1]);
    let output = option_value(args, "-o")?
        .map(PathBuf::from)
        .context("missing output file, pass -o <file>")?;

    let format = match option_value(args, "--format")? {
        Some(name) => OutputFormat::parse(name).with_context(|| format!("unknown format '{}'", name))?,
        None => OutputFormat::from_path(&output)
            .with_context(|| format!("cannot tell the format of {}, pass --format", output.display()))?,
    };

    let page = match option_value(args, "--page")? {
        Some(value) => {
            let n: usize = value.parse().with_context(|| format!("invalid page '{}'", value))?;
            if n == 0 {
                bail!("pages are numbered from 1");
            }
            Some(n - 1)
        }
        None => None,
    };

    let mut doc = load_document(&scene_path)?;
    let mut config = doc.config.clone().unwrap_or_default();
    if let Some(value) = option_value(args, "--dpi")? {
        config.dpi = value.parse().with_context(|| format!("invalid dpi '{}'", value))?;
        if !(config.dpi > 0.0 && config.dpi.is_finite()) {
            bail!("dpi must be positive");
        }
    }
    if let Some(value) = option_value(args, "--background")? {
        config.background = Some(Color::parse(value).with_context(|| format!("invalid colour '{}'", value))?);
    }
    if args.iter().any(|arg| arg == "--stretch") {
        config.stretch_to_fit = true;
    }
    doc.config = Some(config);

    let bytes = match format {
        OutputFormat::Png => render_png(&doc, page)?,
        OutputFormat::Pdf => {
            if page.is_some() {
                bail!("--page applies to PNG output only");
            }
            render_pdf(&doc)?
        }
    };
    write_output(&output, &bytes)?;
    info!(path = %output.display(), bytes = bytes.len(), "written");
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.iter().any(|arg| arg == "-h" || arg == "--help") {
        usage(args.first().map(String::as_str).unwrap_or("vgr-render"));
        process::exit(1);
    }

    let verbose = args.iter().any(|arg| arg == "-v" || arg == "--verbose");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use region_watermark_removal::http::{HttpOracle, OracleConfig, API_KEY_ENV};
use region_watermark_removal::{
    default_output_path, CancelToken, Mode, PipelineOptions, ProcessResult, Quality,
    RegionEngine,
};

#[derive(Parser)]
#[command(
    name = "region-watermark",
    about = "Remove watermarks with an image-edit service, touching only the regions that change",
    version,
    after_help = "Simple usage: region-watermark <image>  (detect regions automatically)\n\
                  Manual usage: region-watermark <image> --mask mask.png [--display-size 800x600]"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Painted mask (alpha channel) marking the watermark; skips detection
    #[arg(short, long)]
    mask: Option<String>,

    /// Size of the canvas the mask was painted on, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size, requires = "mask")]
    display_size: Option<(u32, u32)>,

    /// Quality preset for automatic mode
    #[arg(long, value_enum, default_value_t = Quality::Standard)]
    quality: Quality,

    /// Re-process the same regions with a refinement prompt
    #[arg(long)]
    two_pass: bool,

    /// Custom removal prompt
    #[arg(long)]
    prompt: Option<String>,

    /// Oracle endpoint (overrides ORACLE_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Oracle model (overrides ORACLE_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// API key for the oracle (overrides SILICONFLOW_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Retries on HTTP 429 (0 disables)
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("display size must be non-zero".to_string());
    }
    Ok((w, h))
}

/// Environment settings first, then command-line overrides.
fn resolve_config(cli: &Cli) -> region_watermark_removal::Result<OracleConfig> {
    let api_key = cli.api_key.clone();
    let mut config = OracleConfig::from_lookup(|name| {
        if name == API_KEY_ENV {
            if let Some(key) = &api_key {
                return Some(key.clone());
            }
        }
        std::env::var(name).ok()
    })?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(model) = &cli.model {
        config.model.clone_from(model);
    }
    config.rate_limit_retries = cli.retries;
    Ok(config)
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e} (pass --api-key or set {API_KEY_ENV})");
            process::exit(1);
        }
    };

    let oracle = match HttpOracle::new(config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize oracle client: {e}");
            process::exit(1);
        }
    };
    let engine = RegionEngine::new(oracle);

    let opts = PipelineOptions {
        quality: cli.quality,
        two_pass: cli.two_pass,
        prompt: cli.prompt.clone(),
        refine_prompt: None,
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let results = if input_path.is_dir() {
        if cli.mask.is_some() {
            eprintln!("Error: --mask applies to a single image, not a directory");
            process::exit(1);
        }
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: region-watermark <input_dir> -o <output_dir>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir, &opts, &CancelToken::new())
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        let mode = match &cli.mask {
            Some(mask) => Mode::Manual {
                mask: PathBuf::from(mask),
                display: cli.display_size,
            },
            None => Mode::Auto,
        };
        vec![engine.process_file(input_path, &output_path, &mode, &opts, &CancelToken::new())]
    };

    let mut success_count = 0u32;
    let mut fallback_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &cli);
        if !r.success {
            fail_count += 1;
        } else if r.fallback {
            fallback_count += 1;
        } else {
            success_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Localized: {success_count}");
        if fallback_count > 0 {
            eprint!(", Full-frame: {fallback_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, cli: &Cli) {
    if cli.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if !result.success {
        eprintln!("[FAIL] {filename}: {}", result.message);
    } else if result.fallback {
        eprintln!("[FULL] {filename}: {}", result.message);
    } else {
        eprintln!(
            "[OK] {filename}: {} ({} oracle calls)",
            result.message, result.oracle_calls
        );
    }
}

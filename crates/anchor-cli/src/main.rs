use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use anchor_core::config::AnchorConfig;
use anchor_core::labels::load_ground_truth;
use anchor_core::report::AnchorReport;
use anchor_core::k_mean_cluster;

/// Without a subcommand the flags are taken as `generate` flags.
#[derive(Debug, Parser)]
#[command(
    name = "anchors",
    version,
    about = "Generate detector anchors from ground-truth boxes using IoU k-means",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    generate: GenerateArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Cluster the label file and print the anchors.
    Generate(GenerateArgs),
    /// Check the configuration and the label file without clustering.
    Doctor {
        #[command(flatten)]
        opts: Overrides,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    opts: Overrides,
    /// Also write the report as JSON.
    #[arg(long)]
    json: Option<String>,
}

// snake_case aliases keep the config key spelling usable on the command line
#[derive(Debug, Args)]
struct Overrides {
    /// Optional TOML config; command-line flags take precedence.
    #[arg(long)]
    config: Option<String>,
    /// Number of anchors (K).
    #[arg(long, alias = "num_anchors")]
    num_anchors: Option<usize>,
    /// Label file, one `image_path,x1,y1,x2,y2,label` per line.
    #[arg(long, alias = "label_path")]
    label_path: Option<String>,
    /// Loss convergence threshold.
    #[arg(long)]
    loss: Option<f64>,
    /// Safety cap on k-means iterations.
    #[arg(long, alias = "max_iterations")]
    max_iterations: Option<usize>,
    #[arg(long, alias = "img_width")]
    img_width: Option<u32>,
    #[arg(long, alias = "img_height")]
    img_height: Option<u32>,
    /// Seed for centroid initialization (random when omitted).
    #[arg(long)]
    seed: Option<u64>,
}

impl Overrides {
    fn apply(self, cfg: &mut AnchorConfig) {
        if let Some(v) = self.num_anchors { cfg.kmeans.num_anchors = v; }
        if let Some(v) = self.label_path { cfg.labels.label_path = v; }
        if let Some(v) = self.loss { cfg.kmeans.loss = v; }
        if let Some(v) = self.max_iterations { cfg.kmeans.max_iterations = v; }
        if let Some(v) = self.img_width { cfg.labels.img_width = v; }
        if let Some(v) = self.img_height { cfg.labels.img_height = v; }
        if self.seed.is_some() { cfg.kmeans.seed = self.seed; }
    }
}

fn load_config(mut opts: Overrides) -> Result<AnchorConfig> {
    let mut cfg = match opts.config.take() {
        Some(p) => AnchorConfig::load(&p).with_context(|| format!("load config {}", p))?,
        None => AnchorConfig::default(),
    };
    opts.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    // warnings (e.g. an unconverged run) stay visible without RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Some(Command::Generate(args)) => run_generate(args),
        Some(Command::Doctor { opts }) => doctor(&load_config(opts)?),
        None => run_generate(cli.generate),
    }
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let cfg = load_config(args.opts)?;
    generate(&cfg, args.json.as_deref())
}

fn generate(cfg: &AnchorConfig, json: Option<&str>) -> Result<()> {
    let image = cfg.image_size()?;
    let k = cfg.kmeans.num_anchors;
    let boxes = load_ground_truth(&cfg.labels.label_path, image).context("read labels")?;
    anyhow::ensure!(
        k <= boxes.len(),
        "num_anchors ({}) exceeds number of ground-truth boxes ({})",
        k,
        boxes.len()
    );

    let mut rng = match cfg.kmeans.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    info!("generate: k={} boxes={} loss={}", k, boxes.len(), cfg.kmeans.loss);

    let clustering = k_mean_cluster(k, &boxes, &cfg.kmeans(), &mut rng).context("k-means")?;
    if !clustering.converged {
        warn!("generate: result is best effort after {} steps", clustering.iterations);
    }

    let report = AnchorReport::new(k, &clustering, image);
    print!("{}", report);

    if let Some(path) = json {
        report.write_json(path).with_context(|| format!("write {}", path))?;
        info!("generate: report written to {}", path);
    }
    Ok(())
}

fn doctor(cfg: &AnchorConfig) -> Result<()> {
    info!("doctor: starting");
    let image = cfg.image_size()?;
    let boxes = load_ground_truth(&cfg.labels.label_path, image).context("read labels")?;
    anyhow::ensure!(!boxes.is_empty(), "label file {} has no boxes", cfg.labels.label_path);
    anyhow::ensure!(
        cfg.kmeans.num_anchors <= boxes.len(),
        "kmeans.num_anchors ({}) exceeds number of boxes ({})",
        cfg.kmeans.num_anchors,
        boxes.len()
    );

    let (mut min_w, mut max_w) = (f64::INFINITY, 0.0f64);
    let (mut min_h, mut max_h) = (f64::INFINITY, 0.0f64);
    for b in &boxes {
        min_w = min_w.min(b.w); max_w = max_w.max(b.w);
        min_h = min_h.min(b.h); max_h = max_h.max(b.h);
    }
    if max_w > 1.0 || max_h > 1.0 {
        warn!("doctor: some boxes exceed the image ({}x{}); check img_width/img_height", image.width, image.height);
    }

    info!(
        "doctor: {} boxes, w in [{:.4}, {:.4}], h in [{:.4}, {:.4}]",
        boxes.len(), min_w, max_w, min_h, max_h
    );
    info!("doctor: OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_flags_run_generate() {
        let cli = Cli::try_parse_from(["anchors", "--num_anchors", "3", "--label_path", "train.txt"]).unwrap();
        assert!(cli.cmd.is_none());
        assert_eq!(cli.generate.opts.num_anchors, Some(3));
        assert_eq!(cli.generate.opts.label_path.as_deref(), Some("train.txt"));
    }

    #[test]
    fn generate_subcommand_takes_both_spellings() {
        let cli = Cli::try_parse_from([
            "anchors", "generate", "--num-anchors", "5", "--img_width", "640", "--json", "out.json",
        ])
        .unwrap();
        match cli.cmd {
            Some(Command::Generate(args)) => {
                assert_eq!(args.opts.num_anchors, Some(5));
                assert_eq!(args.opts.img_width, Some(640));
                assert_eq!(args.json.as_deref(), Some("out.json"));
            }
            other => panic!("expected generate, got {other:?}"),
        }
    }

    #[test]
    fn doctor_accepts_config() {
        let cli = Cli::try_parse_from(["anchors", "doctor", "--config", "anchors.toml"]).unwrap();
        match cli.cmd {
            Some(Command::Doctor { opts }) => assert_eq!(opts.config.as_deref(), Some("anchors.toml")),
            other => panic!("expected doctor, got {other:?}"),
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::try_parse_from(["anchors", "--num_anchors", "4", "--max-iterations", "50", "--seed", "7"]).unwrap();
        let cfg = load_config(cli.generate.opts).unwrap();
        assert_eq!(cfg.kmeans.num_anchors, 4);
        assert_eq!(cfg.kmeans.max_iterations, 50);
        assert_eq!(cfg.kmeans.seed, Some(7));
    }
}

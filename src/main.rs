use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bookmark_preview::server::PreviewServer;
use bookmark_preview::years::YearSlot;
use bookmark_preview::{
    Dimension, FailurePolicy, FetchOutcome, HebcalConverter, PreviewConfig, Presenter, Session, YearResolver, YearStrategy,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bookmark-preview", version, about = "Tune, preview and print bookmark sheets")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Rendering service endpoint
    #[arg(long, global = true, default_value = bookmark_preview::DEFAULT_RENDER_ENDPOINT)]
    render_endpoint: String,

    /// Date-conversion service endpoint
    #[arg(long, global = true, default_value = bookmark_preview::DEFAULT_CONVERTER_ENDPOINT)]
    converter_endpoint: String,

    /// Request timeout in milliseconds (0 disables)
    #[arg(long, global = true, default_value_t = 0)]
    timeout_ms: u64,

    /// Offer the fixed year list instead of asking the date-conversion service
    #[arg(long, global = true)]
    static_years: bool,

    /// Replace the fixed year list (implies --static-years)
    #[arg(long = "year-label", global = true)]
    year_labels: Vec<String>,

    /// How service failures reach the user (silent or alert)
    #[arg(long, global = true, default_value = "silent")]
    failure_policy: FailurePolicy,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the interactive preview page
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// Fetch one sheet and write it as a printable HTML document
    Render {
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
        #[arg(long)]
        font: Option<f64>,
        /// Year label; defaults to the current year
        #[arg(long)]
        year: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Print the selectable year labels
    Years {
        /// Reference date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

impl ServiceArgs {
    fn config(&self) -> PreviewConfig {
        let year_strategy = if !self.year_labels.is_empty() {
            YearStrategy::Static(self.year_labels.clone())
        } else if self.static_years {
            YearStrategy::static_default()
        } else {
            YearStrategy::Dynamic
        };
        PreviewConfig {
            render_endpoint: self.render_endpoint.clone(),
            converter_endpoint: self.converter_endpoint.clone(),
            timeout_ms: self.timeout_ms,
            year_strategy,
            failure_policy: self.failure_policy,
            ..Default::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Keep logging setup in the binary so the library remains unopinionated.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.service.config();
    config.validate()?;

    match cli.command {
        Command::Serve { addr } => {
            let session = Arc::new(Session::connect(config)?);
            let server = PreviewServer::bind(&addr, session)?;
            println!("serving bookmark preview at {}", server.url());
            server.run()?;
        }
        Command::Render {
            width,
            height,
            font,
            year,
            out,
        } => render(config, [width, height, font], year, out)?,
        Command::Years { date } => years(&config, date)?,
    }
    Ok(())
}

fn render(config: PreviewConfig, values: [Option<f64>; 3], year: Option<String>, out: Option<PathBuf>) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let values: Vec<(Dimension, f64)> = Dimension::ALL
        .into_iter()
        .zip(values)
        .filter_map(|(dim, value)| value.map(|v| (dim, v)))
        .collect();

    // One request for the whole tuple
    let outcome = match session.apply(&values, year.as_deref()) {
        Ok(FetchOutcome::Unchanged) => session.refresh(),
        other => other,
    }
    .context("failed to render the bookmark")?;
    if outcome == FetchOutcome::Skipped {
        bail!("no year label available; pass --year");
    }

    let document = Presenter::render_document(&session.fragment());
    match out {
        Some(path) => {
            std::fs::write(&path, document).with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => print!("{}", document),
    }
    Ok(())
}

fn years(config: &PreviewConfig, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let today = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let resolver = match &config.year_strategy {
        YearStrategy::Dynamic => YearResolver::new(YearStrategy::Dynamic, Some(Arc::new(HebcalConverter::new(config)?))),
        strategy => YearResolver::new(strategy.clone(), None),
    };
    let options = resolver.resolve(today);
    if options.labels().is_empty() {
        bail!("no year labels could be resolved for {}", today);
    }

    let default = options.default_label();
    if config.year_strategy == YearStrategy::Dynamic {
        for slot in YearSlot::ALL {
            let label = options.slot(slot).unwrap_or("-");
            let marker = if slot == YearSlot::Current && default.is_some() { " *" } else { "" };
            println!("{:?}: {}{}", slot, label, marker);
        }
    } else {
        for label in options.labels() {
            let marker = if Some(label) == default { " *" } else { "" };
            println!("{}{}", label, marker);
        }
    }
    Ok(())
}

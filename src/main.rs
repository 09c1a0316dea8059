use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{fs::File, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use charge_predictor::{
    config::ServiceConfig,
    dataset::StationTable,
    encoder::FeatureEncoder,
    server,
    train::{self, TrainOptions},
    RequestHandler,
};

#[derive(Parser)]
#[command(name = "charge-predictor")]
#[command(about = "EV charging load prediction service", long_about = None)]
struct Cli {
    /// JSON config file; env vars override its values
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /chatbot
    Serve,

    /// Write the dataset with labels replaced by model codes
    Prepare {
        /// Raw station CSV (defaults to the configured dataset)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long, default_value = "Processed_Stations.csv")]
        output: PathBuf,
    },

    /// Fit the regressor and save model + meta.json to the configured paths
    Train {
        #[arg(long, default_value = "100")]
        iterations: usize,

        #[arg(long, default_value = "4")]
        max_depth: u32,

        #[arg(long, default_value = "0.1")]
        learning_rate: f32,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Run one message through the pipeline without the HTTP layer
    Ask {
        message: Option<String>,

        #[arg(long, requires_all = ["station_type", "category"])]
        city: Option<String>,

        #[arg(long)]
        station_type: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },
}

fn encoder_for(cfg: &ServiceConfig, dataset: Option<PathBuf>) -> Result<FeatureEncoder> {
    let path = dataset.unwrap_or_else(|| cfg.dataset_path.clone());
    let table = StationTable::load(&path)?;
    Ok(FeatureEncoder::new(cfg.vocabulary.clone(), Arc::new(table)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charge_predictor=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = ServiceConfig::load(cli.config)?;

    match cli.command {
        Commands::Serve => {
            let addr: SocketAddr = cfg
                .bind_addr
                .parse()
                .with_context(|| format!("invalid bind address {:?}", cfg.bind_addr))?;
            let handler = RequestHandler::from_config(&cfg)?;
            server::serve(Arc::new(handler), addr).await?;
        }
        Commands::Prepare { input, output } => {
            let encoder = encoder_for(&cfg, input)?;
            let file = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let (written, skipped) = train::export_encoded(&encoder, file)?;
            tracing::info!(
                "wrote {} encoded rows to {} ({} skipped)",
                written,
                output.display(),
                skipped
            );
        }
        Commands::Train {
            iterations,
            max_depth,
            learning_rate,
            seed,
        } => {
            let encoder = encoder_for(&cfg, None)?;
            let opts = TrainOptions {
                iterations,
                max_depth,
                shrinkage: learning_rate,
                seed,
                ..TrainOptions::default()
            };
            let (regressor, report) = train::train(&encoder, &opts)?;
            regressor.save(&cfg.model_path, &cfg.meta_path)?;
            tracing::info!(
                "saved model to {} and meta to {}",
                cfg.model_path.display(),
                cfg.meta_path.display()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Ask {
            message,
            city,
            station_type,
            category,
        } => {
            // same template the chat UI sends
            let message = match (city, station_type, category) {
                (Some(c), Some(t), Some(k)) => format!("predict for {} {} {}", c, t, k),
                _ => message.unwrap_or_default(),
            };
            let handler = RequestHandler::from_config(&cfg)?;
            let reply = handler.handle(&message);
            println!("{}", serde_json::to_string(&reply)?);
            if let Some(kw) = reply.load_kw() {
                println!("load_kw={:.2}", kw);
            }
        }
    }
    Ok(())
}

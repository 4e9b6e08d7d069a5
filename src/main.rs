//! Counter-Strike Match Prediction CLI
//!
//! Trains a weighted ensemble of classifiers on recent match history and
//! predicts head-to-head winners.

use clap::{Parser, Subcommand};
use csmatch::{Config, Result};

#[derive(Parser)]
#[command(name = "csmatch")]
#[command(about = "Counter-Strike match prediction from historical results", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Compute statistics, train every model and save a snapshot
    Train {
        /// Statistics reference time (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS), default now
        #[arg(long)]
        as_of: Option<String>,
        /// Train from a JSON rows file instead of the database
        #[arg(long)]
        input: Option<String>,
        /// Train the models one after another
        #[arg(long)]
        sequential: bool,
    },
    /// Predict a single match
    Predict {
        /// First team name
        team_a: String,
        /// Second team name
        team_b: String,
        /// Map the match is played on
        #[arg(long)]
        map: Option<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Predict every fixture in a JSON file
    Batch {
        /// Fixture file (JSON array of upcoming matches)
        fixtures: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Predict a best-of-N series map by map
    Series {
        team_a: String,
        team_b: String,
        /// Maps in play order (odd count)
        #[arg(required = true)]
        maps: Vec<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import raw match rows from a JSON file
    Import {
        /// JSON array of match rows
        file: String,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show snapshot information, metrics and feature importances
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Import { file } => commands::data_import(&config, &file),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Train {
            as_of,
            input,
            sequential,
        } => commands::train(&config, as_of, input, sequential),
        Commands::Predict {
            team_a,
            team_b,
            map,
            format,
        } => commands::predict(&config, &team_a, &team_b, map, format),
        Commands::Batch { fixtures, format } => commands::batch(&config, &fixtures, format),
        Commands::Series {
            team_a,
            team_b,
            maps,
            format,
        } => commands::series(&config, &team_a, &team_b, &maps, format),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use csmatch::data::store::parse_timestamp;
    use csmatch::data::{Database, MatchRecordStore};
    use csmatch::predict::{
        format_prediction, format_series, EngineSnapshot, PredictionEngine, UpcomingMatch,
    };
    use csmatch::training::format_metrics_table;
    use csmatch::PredictError;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        // Create data and model directories
        if let Some(parent) = std::path::Path::new(&config.data.database_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!(
            "Created data and {} directories",
            config.data.model_dir
        );

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'csmatch data import matches.json' to load match history");
        println!("  3. Run 'csmatch train' to train the models");
        println!("  4. Run 'csmatch predict \"Team A\" \"Team B\"' to make predictions");

        Ok(())
    }

    pub fn data_import(config: &Config, file: &str) -> Result<()> {
        let store = MatchRecordStore::load_json(file)?;
        if store.is_empty() {
            println!("No usable rows in {}.", file);
            return Ok(());
        }

        let mut db = Database::open(&config.data.database_path)?;
        let count = db.upsert_matches(store.records())?;
        println!(
            "Stored {} matches in database ({} rows dropped)",
            count,
            store.dropped()
        );

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Teams:    {}", stats.team_count);
        println!("  Maps:     {}", stats.map_count);
        println!("  Matches:  {}", stats.match_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_match, stats.latest_match) {
            println!("  Range:    {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn train(
        config: &Config,
        as_of: Option<String>,
        input: Option<String>,
        sequential: bool,
    ) -> Result<()> {
        let as_of = match as_of {
            Some(raw) => Some(
                parse_timestamp(&raw)
                    .ok_or_else(|| PredictError::Parse(format!("bad --as-of {:?}", raw)))?,
            ),
            None => None,
        };

        let mut config = config.clone();
        if sequential {
            config.training.parallel = false;
        }
        let model_dir = config.data.model_dir.clone();
        let mut engine = PredictionEngine::new(config);

        match input {
            Some(path) => {
                println!("Loading match rows from {}...", path);
                engine.load_json(&path)?;
            }
            None => {
                let db = Database::open(&engine.config().data.database_path)?;
                if db.get_stats()?.match_count == 0 {
                    return Err(PredictError::Config(
                        "No matches in database. Run 'csmatch data import' first.".to_string(),
                    ));
                }
                engine.load_database(&db)?;
            }
        }

        println!("Computing statistics...");
        engine.compute_stats(as_of)?;
        if let Some(teams) = engine.team_stats() {
            println!("  {} teams active in the window", teams.len());
        }

        println!("\nTraining models...\n");
        engine.train()?;

        let snapshot = engine.snapshot()?;
        let ensemble = snapshot.ensemble();
        println!(
            "{}",
            format_metrics_table(ensemble.metrics(), Some(ensemble.weights().as_map()))
        );

        println!("Saving snapshot to {}...", model_dir);
        engine.save_snapshot(&model_dir)?;
        println!("\nTraining complete!");

        Ok(())
    }

    fn load_engine(config: &Config) -> Result<PredictionEngine> {
        let mut engine = PredictionEngine::new(config.clone());
        engine.load_snapshot(&config.data.model_dir)?;
        Ok(engine)
    }

    pub fn predict(
        config: &Config,
        team_a: &str,
        team_b: &str,
        map: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        let engine = load_engine(config)?;
        let prediction = engine.predict(team_a, team_b, map.as_deref())?;

        match format {
            OutputFormat::Table => print!("{}", format_prediction(&prediction)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&prediction)?),
        }

        Ok(())
    }

    pub fn batch(config: &Config, fixtures: &str, format: OutputFormat) -> Result<()> {
        let content = std::fs::read_to_string(fixtures)?;
        let fixtures: Vec<UpcomingMatch> = serde_json::from_str(&content)?;

        let engine = load_engine(config)?;
        let results = engine.predict_batch(&fixtures)?;

        match format {
            OutputFormat::Table => {
                for entry in &results {
                    match (&entry.prediction, &entry.error) {
                        (Some(prediction), _) => print!("{}", format_prediction(prediction)),
                        (None, Some(error)) => println!(
                            "\n{} vs {}: skipped ({})",
                            entry.fixture.team_1, entry.fixture.team_2, error
                        ),
                        (None, None) => {}
                    }
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        }

        Ok(())
    }

    pub fn series(
        config: &Config,
        team_a: &str,
        team_b: &str,
        maps: &[String],
        format: OutputFormat,
    ) -> Result<()> {
        let engine = load_engine(config)?;
        let series = engine.predict_series(team_a, team_b, maps)?;

        match format {
            OutputFormat::Table => print!("{}", format_series(&series)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&series)?),
        }

        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let snapshot = EngineSnapshot::load(&config.data.model_dir)?;
        let ensemble = snapshot.ensemble();

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Path:           {}", config.data.model_dir);
        println!("  Layout:         {} ({} features)", ensemble.layout(), ensemble.layout().width());
        println!("  Stats as of:    {}", snapshot.as_of());
        println!("  Trained at:     {}", snapshot.trained_at());
        println!("  Teams:          {}", snapshot.team_stats().len());
        if let Some(maps) = snapshot.map_stats() {
            println!("  Map tables:     {} teams", maps.len());
        }

        println!(
            "\n{}",
            format_metrics_table(ensemble.metrics(), Some(ensemble.weights().as_map()))
        );

        for (kind, importances) in ensemble.feature_importances() {
            let mut ranked = importances;
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            println!("{} top features:", kind.display_name());
            for (name, value) in ranked.iter().take(5) {
                println!("  {:<16} {:.3}", name, value);
            }
        }

        Ok(())
    }
}

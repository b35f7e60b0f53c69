use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dayplan_core::{
    sanitize, ActivitySuggestion, ClockTime, DayPlanRequest, GeoPoint, TransportMode,
    TravelOptions,
};
use dayplan_observability::{init_tracing, AppMetrics};
use dayplan_planner::{DayPlanner, PlannerConfig};
use dayplan_providers::{
    build_http_client, build_no_redirect_client, GooglePlacesProvider, GoogleRoutingProvider,
    OpenAiTextGenerator, DEFAULT_OPENAI_MODEL,
};

type Planner = DayPlanner<OpenAiTextGenerator, GoogleRoutingProvider, GooglePlacesProvider>;

#[derive(Debug, Parser)]
#[command(name = "dayplan")]
#[command(about = "Plan a single day of activities and the travel between them")]
struct Cli {
    #[arg(long, env = "DAYPLAN_OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    #[arg(long, env = "DAYPLAN_OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    model: String,

    #[arg(long, env = "DAYPLAN_MAPS_API_KEY", hide_env_values = true)]
    maps_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate and reconcile a full day.
    Plan {
        #[arg(long)]
        location: String,
        /// Repeat for several interests.
        #[arg(long = "prefer", required = true)]
        preferences: Vec<String>,
        #[arg(long)]
        start: Option<ClockTime>,
        #[arg(long)]
        end: Option<ClockTime>,
        #[arg(long)]
        budget: Option<f64>,
    },
    Estimate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        depart: ClockTime,
        #[arg(long = "mode", value_parser = parse_mode)]
        modes: Vec<TransportMode>,
        #[arg(long)]
        max_walking_miles: Option<f64>,
    },
    Resolve {
        query: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lng: f64,
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
        #[arg(long, default_value_t = 60)]
        minutes: u32,
    },
    /// Repair a raw model response read from a file or stdin.
    Sanitize { path: Option<PathBuf> },
}

fn parse_mode(value: &str) -> Result<TransportMode, String> {
    TransportMode::parse(value).ok_or_else(|| format!("unknown transport mode `{value}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("dayplan_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Sanitize { path } => {
            let raw = match path {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed reading {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed reading stdin")?;
                    buffer
                }
            };
            let cleaned = sanitize(&raw)?;
            match serde_json::from_str::<serde_json::Value>(&cleaned) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{cleaned}"),
            }
        }
        Command::Plan {
            location,
            preferences,
            start,
            end,
            budget,
        } => {
            let planner = build_planner(cli.openai_key, cli.model, cli.maps_key)?;
            let itinerary = planner
                .plan_day(&DayPlanRequest {
                    location,
                    preferences,
                    start_time: start,
                    end_time: end,
                    budget,
                    travel: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&itinerary)?);
        }
        Command::Estimate {
            from,
            to,
            depart,
            modes,
            max_walking_miles,
        } => {
            let planner = build_planner(cli.openai_key, cli.model, cli.maps_key)?;
            let mut options = planner.default_travel_options();
            if !modes.is_empty() {
                options.preferred_modes = modes;
            }
            if let Some(miles) = max_walking_miles {
                options.max_walking_distance = miles;
            }
            let travel = planner
                .estimate_travel(&from, &to, depart, Some(options))
                .await?;
            println!("{}", serde_json::to_string_pretty(&travel)?);
        }
        Command::Resolve {
            query,
            lat,
            lng,
            cost,
            minutes,
        } => {
            let planner = build_planner(cli.openai_key, cli.model, cli.maps_key)?;
            let suggestion = ActivitySuggestion {
                name: query.clone(),
                description: String::new(),
                search_query: query,
                estimated_cost: cost,
                duration_minutes: minutes,
                activity_type: Vec::new(),
                start_time: None,
            };
            let activity = planner.resolve(&suggestion, GeoPoint { lat, lng }).await;
            println!("{}", serde_json::to_string_pretty(&activity)?);
        }
    }

    Ok(())
}

fn build_planner(
    openai_key: Option<String>,
    model: String,
    maps_key: Option<String>,
) -> Result<Planner> {
    let http = build_http_client().context("failed to build HTTP client")?;
    let photo_http = build_no_redirect_client().context("failed to build photo HTTP client")?;
    let maps_key = maps_key.filter(|key| !key.trim().is_empty());

    Ok(DayPlanner::new(
        PlannerConfig::from_env(),
        OpenAiTextGenerator::new(http.clone(), openai_key, model),
        GoogleRoutingProvider::connect(http.clone(), maps_key.clone()),
        GooglePlacesProvider::connect(http, photo_http, maps_key),
        AppMetrics::shared(),
    ))
}

use calorie_quest::config::{Config, DeviceConfig};
use calorie_quest::location::providers::http_agent;
use calorie_quest::location::{LocationResolver, LocationSnapshot, Notifier};
use calorie_quest::logging;
use calorie_quest::search::{
    parse_limit, render_restaurant_list, RestaurantSearch, SearchClient, SearchFilters,
    SearchQuery,
};
use calorie_quest::server::{self, AppState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CalorieQuest: find nearby fast food by calories and distance.
///
/// Location is resolved through device geolocation (gpsd), then IP lookup,
/// then a built-in default.
///
/// Examples:
///   calorie-quest locate
///   calorie-quest --no-device locate
///   calorie-quest --lat 34.05 --lon -118.24 search --calories 500 --mileage 3
///   calorie-quest serve --port 8080
#[derive(Parser)]
#[command(name = "calorie-quest", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.calorie-quest/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fixed device latitude (-90 to 90). Requires --lon.
    #[arg(long, allow_hyphen_values = true, requires = "lon", global = true)]
    lat: Option<f64>,

    /// Fixed device longitude (-180 to 180). Requires --lat.
    #[arg(long, allow_hyphen_values = true, requires = "lat", global = true)]
    lon: Option<f64>,

    /// Treat the host as having no geolocation capability.
    #[arg(long, conflicts_with_all = ["lat", "gpsd"], global = true)]
    no_device: bool,

    /// gpsd address (host:port).
    #[arg(long, global = true)]
    gpsd: Option<String>,

    /// Restaurant search backend base URL.
    #[arg(long, global = true)]
    search_url: Option<String>,

    /// Verbose logging.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the current location and print it as JSON.
    Locate,
    /// Resolve the location and search nearby restaurants.
    Search {
        /// Maximum calories per item, or "any".
        #[arg(long, default_value = "any", value_parser = parse_limit)]
        calories: std::option::Option<u32>,
        /// Maximum distance in miles, or "any".
        #[arg(long, default_value = "any", value_parser = parse_limit)]
        mileage: std::option::Option<u32>,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

/// Prints notices on stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("  \u{26A0}\u{FE0F}  {}", message);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Command::Serve { .. }, false) => "info",
        _ => "warn",
    };
    logging::initialize_logging(level);

    let config = load_config(&cli);

    match cli.command {
        Command::Locate => {
            let resolver = build_resolver(&config);
            let snap = resolver.resolve_now().await;
            print_location(&snap);
            println!("{}", to_json(&snap));
        }
        Command::Search { calories, mileage } => {
            let resolver = build_resolver(&config);
            let snap = resolver.resolve_now().await;
            print_location(&snap);

            let Some(location) = snap.location else {
                eprintln!("Error: No location available.");
                std::process::exit(1);
            };
            let filters = SearchFilters {
                max_calories: calories,
                max_miles: mileage,
            };
            let client = search_client(&config);
            match client.search(SearchQuery::new(&location, filters)).await {
                Ok(restaurants) => {
                    eprint!("{}", render_restaurant_list(location.coordinates(), &restaurants));
                    println!("{}", to_json(&restaurants));
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Serve { ref host, port } => {
            let state = Arc::new(AppState::new(
                Arc::new(LocationResolver::from_config(&config)),
                Arc::new(search_client(&config)),
            ));
            if let Err(e) = server::start(state, host, port).await {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => Config::load(),
    };

    // Flags override the file.
    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            eprintln!("Error: Invalid coordinates. Lat: -90..90, Lon: -180..180");
            std::process::exit(1);
        }
        config.device = DeviceConfig::Fixed {
            latitude: lat,
            longitude: lon,
        };
    } else if cli.no_device {
        config.device = DeviceConfig::Disabled;
    } else if let Some(addr) = &cli.gpsd {
        config.device = DeviceConfig::Gpsd { addr: addr.clone() };
    }
    if let Some(url) = &cli.search_url {
        config.search.base_url = url.clone();
    }
    config
}

fn build_resolver(config: &Config) -> LocationResolver {
    LocationResolver::from_config(config).with_notifier(Arc::new(StderrNotifier))
}

fn search_client(config: &Config) -> SearchClient {
    let agent = http_agent(
        &config.services.user_agent,
        Duration::from_secs(config.services.http_timeout_secs),
    );
    SearchClient::new(agent, config.search.base_url.clone())
}

fn print_location(snap: &LocationSnapshot) {
    if let Some(location) = &snap.location {
        eprintln!("  {}", location.display_line());
    }
    if let Some(source) = snap.source {
        eprintln!("  \u{1F6F0}\u{FE0F}  Source: {}", source);
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error: Cannot encode output: {}", e);
        std::process::exit(1);
    })
}

//! piflora - Raspberry Pi climate node binary
//!
//! Samples the climate sensor on a fixed interval, publishes readings to the
//! MQTT broker and serves the reading page and trigger API.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use piflora::climate::dewpoint::round_to;
use piflora::climate::sensor::{initialize_sensor, DefaultSensor, SensorSettings};
use piflora::config::parse_trigger_spec;
use piflora::triggers::DefaultOutputBank;
use piflora::{
    calc_dewpoint, spawn_schedule, start_web_server, stop_schedule, AppState, BrokerConfig,
    ClimateSensor, MqttPublisher, NodeConfig, ReadingPipeline, ReadingStore, TriggerConfig,
    TriggerRegistry, WebConfig, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT,
    DEFAULT_BROKER_TIMEOUT_SECS, DEFAULT_CLIENT_ID, DEFAULT_INTERVAL_SECS,
    DEFAULT_SENSOR_TIMEOUT_SECS, DEFAULT_TOPIC, DEFAULT_TRIGGER, DEFAULT_TRIGGER_PIN,
    DEFAULT_WEB_PORT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long a running reading cycle may take to finish after shutdown.
const SCHEDULE_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "piflora")]
#[command(about = "🌱 piflora - Raspberry Pi climate node")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Publishes HDC1080 climate readings over MQTT and switches GPIO triggers over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Trigger definition as NAME=PIN (BCM numbering), repeatable
    #[arg(short = 't', long = "trigger", value_name = "NAME=PIN", value_parser = parse_trigger_arg)]
    triggers: Vec<(String, u8)>,

    #[command(flatten)]
    broker: BrokerArgs,

    /// Seconds between sensor readings
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Seconds a single sensor read may take
    #[arg(long, default_value_t = DEFAULT_SENSOR_TIMEOUT_SECS)]
    sensor_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Args)]
struct BrokerArgs {
    /// MQTT broker host
    #[arg(long, env = "PIFLORA_BROKER_HOST", default_value = DEFAULT_BROKER_HOST)]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, env = "PIFLORA_BROKER_PORT", default_value_t = DEFAULT_BROKER_PORT)]
    broker_port: u16,

    /// Topic readings are published to
    #[arg(long, env = "PIFLORA_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// MQTT client identifier
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// Seconds to wait for the broker to acknowledge a publish
    #[arg(long, default_value_t = DEFAULT_BROKER_TIMEOUT_SECS)]
    broker_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node (default)
    Serve,

    /// Take a single reading, print it and exit
    Read(ReadArgs),

    /// Show sensor and trigger information
    Info,
}

#[derive(Args)]
struct ReadArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

fn parse_trigger_arg(spec: &str) -> Result<(String, u8), String> {
    parse_trigger_spec(spec).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    // Print banner
    print_banner();

    match &cli.command {
        Some(Commands::Serve) | None => serve_command(&cli).await?,
        Some(Commands::Read(args)) => read_command(args)?,
        Some(Commands::Info) => info_command(&cli)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("🌱 piflora - Raspberry Pi climate node");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn node_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let triggers = if cli.triggers.is_empty() {
        TriggerConfig::from_pairs([(DEFAULT_TRIGGER, DEFAULT_TRIGGER_PIN)])?
    } else {
        TriggerConfig::from_pairs(cli.triggers.iter().map(|(name, pin)| (name.as_str(), *pin)))?
    };

    let broker = BrokerConfig::default()
        .with_host(&cli.broker.broker_host)
        .with_port(cli.broker.broker_port)
        .with_topic(&cli.broker.topic)
        .with_client_id(&cli.broker.client_id)
        .with_timeout(Duration::from_secs(cli.broker.broker_timeout));

    let config = NodeConfig {
        web: WebConfig::new(&cli.host, cli.port).with_cors(!cli.no_cors),
        broker,
        triggers,
        read_interval: Duration::from_secs(cli.interval),
        sensor_timeout: Duration::from_secs(cli.sensor_timeout),
    };
    config.validate()?;

    Ok(config)
}

/// Open the sensor and apply the startup configuration.
///
/// Only opening the device is fatal; identification problems are logged and
/// left to the reading cycles to surface.
fn open_sensor() -> anyhow::Result<Box<dyn ClimateSensor>> {
    let mut sensor = DefaultSensor::new().context("Failed to open climate sensor")?;

    match initialize_sensor(&mut sensor, &SensorSettings::default()) {
        Ok(identity) => info!("Sensor ready: {:?}", identity),
        Err(e) => warn!("Failed to configure climate sensor: {}", e),
    }

    Ok(Box::new(sensor))
}

async fn serve_command(cli: &Cli) -> anyhow::Result<()> {
    info!("Starting piflora node...");
    let config = node_config(cli)?;

    // Pins first: a node that cannot drive its outputs must not come up.
    let bank = DefaultOutputBank::new().context("Failed to open GPIO")?;
    let registry = Arc::new(
        TriggerRegistry::initialize(&config.triggers, &bank)
            .context("Failed to initialize triggers")?,
    );
    for (name, pin) in config.triggers.iter() {
        info!("  - trigger {} on pin {}", name, pin);
    }

    let readings = ReadingStore::new();
    let publisher = Arc::new(MqttPublisher::new(config.broker.clone()));
    let pipeline = Arc::new(
        ReadingPipeline::new(
            open_sensor()?,
            publisher,
            config.broker.topic.clone(),
            readings.clone(),
        )
        .with_sensor_timeout(config.sensor_timeout),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let schedule = spawn_schedule(pipeline, config.read_interval, stop_rx);

    info!("Node configuration:");
    info!("  - Bind address: {}", config.web.bind_address());
    info!("  - CORS enabled: {}", config.web.enable_cors);
    info!(
        "  - Broker: {}:{} topic {}",
        config.broker.host, config.broker.port, config.broker.topic
    );
    info!("  - Reading interval: {:?}", config.read_interval);

    let state = AppState::new(Arc::clone(&registry), readings);
    let served = start_web_server(config.web.clone(), state, shutdown_signal()).await;

    // Outputs go inactive before anything else; a cycle may be stuck on the broker.
    registry.shutdown().await;
    info!("Outputs switched off and released");

    stop_schedule(schedule, &stop_tx, SCHEDULE_STOP_GRACE).await;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

fn read_command(args: &ReadArgs) -> anyhow::Result<()> {
    let mut sensor = open_sensor()?;
    let measurement = sensor.measure()?;

    let temperature = round_to(measurement.temperature, 2);
    let humidity = round_to(measurement.humidity, 1);
    let dewpoint = calc_dewpoint(temperature, humidity).ok().map(|d| round_to(d, 1));

    match args.format.as_str() {
        "json" => {
            let json = serde_json::json!({
                "temperature": temperature,
                "humidity": humidity,
                "dewpoint": dewpoint,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        "pretty" => {
            println!("🌡️  Temperature: {:.2} °C", temperature);
            println!("💧 Humidity:    {:.1} %", humidity);
            match dewpoint {
                Some(d) => println!("🌫️  Dew point:   {:.1} °C", d),
                None => println!("🌫️  Dew point:   n/a"),
            }
        }
        other => {
            anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other);
        }
    }

    Ok(())
}

fn info_command(cli: &Cli) -> anyhow::Result<()> {
    let config = node_config(cli)?;

    println!("🌱 piflora Node Information");
    println!("===========================");
    println!();

    let mut sensor = DefaultSensor::new().context("Failed to open climate sensor")?;
    let identity = sensor.identify()?;
    println!("Sensor:");
    println!("  Manufacturer ID: 0x{:X}", identity.manufacturer_id);
    println!("  Device ID: 0x{:X}", identity.device_id);
    println!("  Serial Number: 0x{:X}", identity.serial_number);
    println!("  Configuration register: 0x{:X}", sensor.read_config()?);
    println!();

    println!("Triggers:");
    for (name, pin) in config.triggers.iter() {
        println!("  {}: pin {}", name, pin);
    }
    println!();

    println!("Broker:");
    println!("  {}:{} -> {}", config.broker.host, config.broker.port, config.broker.topic);
    println!();

    println!("Features compiled:");
    #[cfg(feature = "gpio")]
    println!("  - GPIO/I2C hardware: ✓");
    #[cfg(not(feature = "gpio"))]
    println!("  - GPIO/I2C hardware: ✗ (simulated)");

    Ok(())
}

use clap::Parser;
use contact_sentry::config::{self, Config, SensorBackend};
use contact_sentry::error::Result;
use contact_sentry::instance_lock::InstanceLock;
use contact_sentry::sensors;
use contact_sentry::server::Server;
use log::{error, info};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "contact-sentry")]
#[command(about = "Keeps WebSocket clients in sync with a GPIO contact sensor")]
struct Cli {
    /// Port to listen on
    #[arg(long, short, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Use the simulated sensor line instead of GPIO
    #[arg(long)]
    simulate: bool,

    /// GPIO number of the sensor line
    #[arg(long, env = "GPIO_PIN")]
    pin: Option<u32>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before anything else, while still single-threaded
    config::load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(pin) = cli.pin {
        config.sensor.gpio_pin = pin;
    }
    if cli.simulate {
        config.sensor.backend = SensorBackend::Simulated;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting contact sentry");
    info!("Configuration loaded:");
    info!(
        "  Listen: {}:{}{}",
        config.server.bind_address, config.server.port, config.server.ws_path
    );
    info!("  Sensor backend: {:?}", config.sensor.backend);
    info!("  GPIO pin: {}", config.sensor.gpio_pin);
    info!("  Poll interval: {:?}", config.sensor.poll_interval());

    // Only one process may own a physical line
    let _lock = match config.sensor.backend {
        SensorBackend::Sysfs => Some(InstanceLock::acquire(&format!(
            "gpio{}",
            config.sensor.gpio_pin
        ))?),
        SensorBackend::Simulated => None,
    };

    let line = sensors::from_config(&config.sensor);
    let server = Arc::new(Server::new(config));
    let listener = server.bind().await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    info!("Contact sentry is running, press Ctrl+C to exit");
    server.run(listener, line, shutdown).await?;

    info!("Contact sentry stopped");
    Ok(())
}

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use webdrivers::{Family, ProxySettings, Settings, Updater, Version};

#[derive(Parser)]
#[command(name = "webdrivers")]
#[command(author, version, about = "Keeps browser automation drivers in sync with the installed browsers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory drivers are installed into (default: ~/.webdrivers)
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,

    /// Seconds a resolved version stays cached; 0 disables the cache
    #[arg(long, global = true)]
    cache_time: Option<u64>,

    /// Proxy host
    #[arg(long, global = true, requires = "proxy_port")]
    proxy_addr: Option<String>,

    /// Proxy port
    #[arg(long, global = true, requires = "proxy_addr")]
    proxy_port: Option<u16>,

    #[arg(long, global = true)]
    proxy_user: Option<String>,

    #[arg(long, global = true)]
    proxy_pass: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update a driver and print its path
    Update(Resolve),

    /// Print the installed driver version
    Current {
        /// Driver family
        driver: Family,
    },

    /// Print the version that should be installed
    Latest(Resolve),

    /// List the releases published for this platform
    Releases {
        /// Driver family
        driver: Family,
    },

    /// Delete an installed driver and its cached version
    Remove {
        /// Driver family
        driver: Family,
    },

    /// Print where a driver is (or would be) installed
    Path {
        /// Driver family
        driver: Family,
    },
}

#[derive(Args)]
struct Resolve {
    /// Driver family (chromedriver, msedgedriver, geckodriver, iedriver, mswebdriver, phantomjs)
    driver: Family,

    /// Pin this driver version instead of resolving the latest one
    #[arg(long)]
    required_version: Option<Version>,

    /// Browser executable to take the version from
    #[arg(long)]
    browser_path: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::from_env().context("invalid WD_* environment")?;
        if let Some(dir) = &self.install_dir {
            settings.install_dir = dir.clone();
        }
        if let Some(secs) = self.cache_time {
            settings.cache_time = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeout {
            settings.timeout = Some(Duration::from_secs(secs));
        }
        if let (Some(host), Some(port)) = (&self.proxy_addr, self.proxy_port) {
            settings.proxy = Some(ProxySettings {
                host: host.clone(),
                port,
                user: self.proxy_user.clone(),
                password: self.proxy_pass.clone(),
            });
        }
        Ok(settings)
    }
}

fn updater(settings: &Settings, driver: Family) -> anyhow::Result<Updater> {
    Ok(Updater::for_family(driver, settings.clone())?)
}

fn resolving_updater(settings: &Settings, resolve: Resolve) -> anyhow::Result<Updater> {
    let mut settings = settings.clone();
    if resolve.browser_path.is_some() {
        settings.browser_path = resolve.browser_path;
    }
    let updater = Updater::for_family(resolve.driver, settings)?;
    Ok(match resolve.required_version {
        Some(version) => updater.with_required_version(version),
        None => updater,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings()?;

    match cli.command {
        Commands::Update(resolve) => {
            let path = resolving_updater(&settings, resolve)?.update().await?;
            println!("{}", path.display());
        }
        Commands::Latest(resolve) => {
            let version = resolving_updater(&settings, resolve)?.latest_version().await?;
            println!("{version}");
        }
        Commands::Current { driver } => match updater(&settings, driver)?.current_version().await {
            Some(version) => println!("{version}"),
            None => anyhow::bail!("{driver} is not installed in {}", settings.install_dir.display()),
        },
        Commands::Releases { driver } => {
            for (version, url) in updater(&settings, driver)?.releases().await? {
                println!("{version}\t{url}");
            }
        }
        Commands::Remove { driver } => {
            updater(&settings, driver)?.remove().await?;
        }
        Commands::Path { driver } => {
            println!("{}", updater(&settings, driver)?.binary_path().display());
        }
    }

    Ok(())
}

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{modifiers, presets, ContentArrangement, Table};
use terminal_size::{terminal_size, Width};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use yc_agents::config::{self, ProfileSettings};
use yc_agents::models::{AgentUserData, LookupEntry};
use yc_agents::{CloudClient, CloudImage, CloudInstance};

#[derive(Parser)]
#[command(
    name = "yca",
    author,
    version,
    about = "Elastic build agents on Yandex Compute Cloud",
    long_about = r#"yca drives build-agent virtual machines declared as images on one cloud profile.

Credentials and profile settings come from environment variables (optionally loaded
from a .env file): YC_ACCESS_KEY or YC_ACCESS_KEY_FILE, YC_SERVER_ID, YC_PROFILE_ID,
YC_IMAGES_FILE, YC_ID_STORAGE, YC_API_ENDPOINT, YC_SYNC_INTERVAL_SECS.

Examples:
  yca check-access
  yca subnets
  yca start agent- --server-url https://ci.example.com --auth-token s3cret
  yca run
"#,
    after_help = "Use `yca <subcommand> --help` to get subcommand specific options."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to .env file
    #[arg(long, global = true)]
    env_file: Option<String>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the service account may manage instances in its folder
    CheckAccess,
    /// List source images of the service account's folder
    Images,
    /// List availability zones
    Zones,
    /// List networks
    Networks,
    /// List subnets
    Subnets,
    /// List disk types
    DiskTypes,
    /// Run one reconciliation sweep and print every image's instances
    Instances,
    /// Start a new instance of an image
    Start {
        /// Image source id
        image: String,
        /// Server address the agent connects to
        #[arg(long, default_value = "")]
        server_url: String,
        /// Authorization token handed to the agent
        #[arg(long, default_value = "")]
        auth_token: String,
    },
    /// Stop or delete an instance, following the image's clone behaviour
    Stop { image: String, name: String },
    /// Restart an instance
    Restart { image: String, name: String },
    /// Power on a stopped instance
    PowerOn { image: String, name: String },
    /// Delete an instance immediately
    Delete { image: String, name: String },
    /// Reconcile periodically until interrupted
    Run,
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table
}

fn print_lookup(entries: &[LookupEntry]) {
    if entries.is_empty() {
        println!("(empty list)");
        return;
    }
    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Detail"]);
    for e in entries {
        table.add_row(vec![e.id.clone(), e.display.clone(), e.detail.clone().unwrap_or_default()]);
    }
    println!("\n{table}\n");
}

fn print_instances(image: &CloudImage) {
    println!(
        "{} {} ({} max)",
        yansi::Paint::new("Image").bold(),
        yansi::Paint::new(image.source_id()).cyan(),
        image.details().max_instances
    );
    let instances = image.instances();
    if instances.is_empty() {
        println!("(no instances)\n");
        return;
    }
    let mut table = new_table();
    table.set_header(vec!["Name", "Status", "Compute ID", "IP", "Zone", "Error"]);
    for i in instances {
        table.add_row(vec![
            i.name().to_string(),
            i.status().to_string(),
            i.compute_id().unwrap_or_default(),
            i.ip_address().unwrap_or_default(),
            i.zone().to_string(),
            i.error().map(|e| e.message).unwrap_or_default(),
        ]);
    }
    println!("{table}\n");
}

fn fail(message: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!("{}: {}", message, error);
    eprintln!("{}: {}", yansi::Paint::new(message).red(), error);
    process::exit(1);
}

async fn connect() -> (ProfileSettings, CloudClient) {
    let settings = ProfileSettings::from_env().unwrap_or_else(|e| fail("Invalid configuration", e));
    let client = CloudClient::connect(&settings)
        .await
        .unwrap_or_else(|e| fail("Failed to connect", e));
    (settings, client)
}

async fn locate(client: &CloudClient, image: &str, name: &str) -> (Arc<CloudImage>, Arc<CloudInstance>) {
    let found = client
        .find_image(image)
        .unwrap_or_else(|| fail("Unknown image", image));
    if let Err(e) = client.update_instances().await {
        fail("Failed to fetch instances", e);
    }
    let instance = found
        .find_instance(name)
        .unwrap_or_else(|| fail("Unknown instance", name));
    (found, instance)
}

const WORKFLOW_TIMEOUT: Duration = Duration::from_secs(600);

/// Wait for the image's workflows before the runtime shuts down
async fn settle(image: &CloudImage) {
    if tokio::time::timeout(WORKFLOW_TIMEOUT, image.wait_for_workflows()).await.is_err() {
        eprintln!(
            "{}",
            yansi::Paint::new("Timed out waiting for the provider; the request may still be in progress").yellow()
        );
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }

    config::load_env_file(cli.env_file.as_deref());
    let (settings, client) = connect().await;
    let connector = Arc::clone(client.connector());

    match cli.command {
        Commands::CheckAccess => match connector.check_access().await {
            Ok(()) => println!("{}", yansi::Paint::new("Service account has the required access").green()),
            Err(e) => fail("Access check failed", e),
        },
        Commands::Images => print_lookup(&connector.list_images().await.unwrap_or_else(|e| fail("Failed to list images", e))),
        Commands::Zones => print_lookup(&connector.list_zones().await.unwrap_or_else(|e| fail("Failed to list zones", e))),
        Commands::Networks => {
            print_lookup(&connector.list_networks().await.unwrap_or_else(|e| fail("Failed to list networks", e)))
        }
        Commands::Subnets => {
            print_lookup(&connector.list_subnets().await.unwrap_or_else(|e| fail("Failed to list subnets", e)))
        }
        Commands::DiskTypes => {
            print_lookup(&connector.list_disk_types().await.unwrap_or_else(|e| fail("Failed to list disk types", e)))
        }
        Commands::Instances => {
            if let Err(e) = client.update_instances().await {
                fail("Failed to fetch instances", e);
            }
            for image in client.images() {
                print_instances(image);
            }
        }
        Commands::Start {
            image,
            server_url,
            auth_token,
        } => {
            let found = client.find_image(&image).unwrap_or_else(|| fail("Unknown image", &image));
            let problems = found.check().await;
            if !problems.is_empty() {
                fail("Image is not usable", problems.join("; "));
            }
            if let Err(e) = client.update_instances().await {
                fail("Failed to fetch instances", e);
            }
            let user_data = AgentUserData::new(server_url, auth_token, settings.profile_id.clone());
            let instance = found
                .start_new_instance(&user_data)
                .unwrap_or_else(|e| fail("Failed to start instance", e));
            println!(
                "{} {}",
                yansi::Paint::new("Scheduled instance").green(),
                yansi::Paint::new(instance.name()).cyan()
            );
            settle(&found).await;
            print_instances(&found);
        }
        Commands::Stop { image, name } => {
            let (found, instance) = locate(&client, &image, &name).await;
            if let Err(e) = found.terminate_instance(&instance) {
                fail("Failed to stop instance", e);
            }
            settle(&found).await;
            print_instances(&found);
        }
        Commands::Restart { image, name } => {
            let (found, instance) = locate(&client, &image, &name).await;
            if let Err(e) = found.restart_instance(&instance) {
                fail("Failed to restart instance", e);
            }
            settle(&found).await;
            print_instances(&found);
        }
        Commands::PowerOn { image, name } => {
            let (_, instance) = locate(&client, &image, &name).await;
            match connector.start_vm(&instance).await {
                Ok(()) => println!("{} {}", yansi::Paint::new("Requested power-on of").green(), name),
                Err(e) => fail("Failed to power on instance", e),
            }
        }
        Commands::Delete { image, name } => {
            let (found, instance) = locate(&client, &image, &name).await;
            match connector.delete_vm(&instance).await {
                Ok(()) => {
                    found.forget_instance(&name);
                    println!("{} {}", yansi::Paint::new("Requested deletion of").green(), name);
                }
                Err(e) => fail("Failed to delete instance", e),
            }
        }
        Commands::Run => {
            let client = Arc::new(client);
            let updater = client.spawn_updater(settings.sync_interval);
            println!(
                "{} {} {}",
                yansi::Paint::new("Reconciling").green(),
                client.images().len(),
                yansi::Paint::new("images; press Ctrl-C to stop").green()
            );
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(%e, "Failed to listen for Ctrl-C");
            }
            client.dispose();
            if let Err(e) = updater.await {
                tracing::warn!(%e, "Updater task ended abnormally");
            }
        }
    }
}

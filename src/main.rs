use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gridring::admin::{run_admin, AdminConfig};
use gridring::config::{resolve_tiebreak, PlantConfig, SensorConfig};
use gridring::node::PlantNode;
use gridring::proto::admin_service_client::AdminServiceClient;
use gridring::proto::plant_service_client::PlantServiceClient;
use gridring::proto::{
    ListDemandsRequest, ListPlantsRequest, NodeStatusRequest, SubmitDemandRequest,
};
use gridring::shutdown::shutdown_token;

#[derive(Parser, Debug)]
#[command(name = "gridring")]
#[command(version)]
#[command(about = "Leaderless ring-election coordinator for power-plant nodes")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a plant node
    Plant(PlantArgs),

    /// Run the administration server (registry + demand bus + telemetry)
    Admin(AdminArgs),

    /// Demand management commands
    Demand {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: DemandCommands,
    },

    /// List registered plants
    Plants {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Query a plant node's election status
    Status {
        /// Plant address (e.g. http://127.0.0.1:50051)
        #[arg(long, short = 'p', default_value = "http://127.0.0.1:50051")]
        plant: String,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

// =============================================================================
// Plant Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct PlantArgs {
    /// Plant id (unique across the network)
    #[arg(long)]
    plant_id: String,

    /// Numeric election tiebreak; defaults to the plant id when it is numeric
    #[arg(long)]
    tiebreak: Option<u64>,

    /// Port to listen on for the ring gRPC protocol
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Address other plants use to reach this node
    #[arg(long, default_value = "127.0.0.1")]
    advertise: String,

    /// Administration server address
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    admin: String,

    /// Simulated token evaluation latency in milliseconds
    #[arg(long, default_value = "3000")]
    eval_delay_ms: u64,

    /// Bounded wait for token sends to the successor, in seconds
    #[arg(long, default_value = "15")]
    send_timeout_secs: u64,
}

// =============================================================================
// Admin Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct AdminArgs {
    /// Port for the admin gRPC server
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Port for the web dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Generate a random demand every N seconds (optional)
    #[arg(long)]
    generate_secs: Option<u64>,

    /// Minimum generated demand in kWh
    #[arg(long, default_value = "5000")]
    min_amount: f64,

    /// Maximum generated demand in kWh
    #[arg(long, default_value = "15000")]
    max_amount: f64,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Administration server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum DemandCommands {
    /// Submit a new energy demand
    Submit {
        /// Demanded energy in kWh
        #[arg(long)]
        amount: f64,
    },
    /// List known demands
    List {
        /// Include demands that already have a winner
        #[arg(long)]
        all: bool,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct DemandSubmitOutput {
    request_id: String,
    created_at_ms: i64,
}

#[derive(Serialize)]
struct DemandListItem {
    request_id: String,
    amount_kwh: f64,
    created_at_ms: i64,
    claimed: bool,
    claimed_by: Option<String>,
}

#[derive(Serialize)]
struct PlantListItem {
    plant_id: String,
    tiebreak: u64,
    address: String,
    port: u32,
}

#[derive(Serialize)]
struct StatusOutput {
    plant_id: String,
    status: String,
    current_request_id: Option<String>,
    current_bid: f64,
    next_id: Option<String>,
    prev_id: Option<String>,
    pending_tokens: u32,
    queued_demands: u32,
    processed_requests: u64,
    dropped_tokens: u64,
    duplicate_submissions: u64,
    elections_started: u64,
    elections_won: u64,
    elections_relayed: u64,
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// =============================================================================
// Server Commands
// =============================================================================

async fn run_plant(args: PlantArgs) -> Result<(), Box<dyn std::error::Error>> {
    let Some(tiebreak) = resolve_tiebreak(&args.plant_id, args.tiebreak) else {
        return Err(format!(
            "plant id {:?} is not numeric, pass an explicit --tiebreak",
            args.plant_id
        )
        .into());
    };

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = PlantConfig {
        plant_id: args.plant_id,
        tiebreak,
        listen_addr,
        advertise_address: args.advertise,
        admin_addr: args.admin,
        evaluation_delay_ms: args.eval_delay_ms,
        send_timeout_secs: args.send_timeout_secs,
        introduce_timeout_secs: 10,
        sensor: SensorConfig::default(),
    };

    let node = PlantNode::bootstrap(config).await?;
    node.run(shutdown_token()).await?;
    Ok(())
}

async fn run_admin_server(args: AdminArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AdminConfig {
        listen_addr: format!("0.0.0.0:{}", args.port).parse()?,
        dashboard_addr: match args.dashboard_port {
            Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
            None => None,
        },
        generate_interval: args.generate_secs.map(Duration::from_secs),
        min_amount_kwh: args.min_amount,
        max_amount_kwh: args.max_amount,
    };

    run_admin(config, shutdown_token()).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_demand_submit(
    addr: &str,
    amount: f64,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = AdminServiceClient::connect(addr.to_string()).await?;
    let reply = client
        .submit_demand(SubmitDemandRequest { amount_kwh: amount })
        .await?
        .into_inner();

    match output {
        OutputFormat::Json => {
            let out = DemandSubmitOutput {
                request_id: reply.request_id,
                created_at_ms: reply.created_at_ms,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Demand submitted!");
            println!("Request ID: {}", reply.request_id);
        }
    }
    Ok(())
}

async fn handle_demand_list(
    addr: &str,
    all: bool,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = AdminServiceClient::connect(addr.to_string()).await?;
    let reply = client
        .list_demands(ListDemandsRequest {
            include_claimed: all,
        })
        .await?
        .into_inner();

    let items: Vec<DemandListItem> = reply
        .demands
        .into_iter()
        .map(|d| DemandListItem {
            request_id: d.request_id,
            amount_kwh: d.amount_kwh,
            created_at_ms: d.created_at_ms,
            claimed: d.claimed,
            claimed_by: none_if_empty(d.claimed_by),
        })
        .collect();

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No demands found.");
            } else {
                println!("{:<38} {:<10} STATE", "REQUEST ID", "KWH");
                println!("{}", "-".repeat(62));
                for item in &items {
                    let state = match &item.claimed_by {
                        Some(plant) => format!("claimed by {}", plant),
                        None => "open".to_string(),
                    };
                    println!("{:<38} {:<10} {}", item.request_id, item.amount_kwh, state);
                }
            }
        }
    }
    Ok(())
}

async fn handle_plants(addr: &str, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = AdminServiceClient::connect(addr.to_string()).await?;
    let reply = client.list_plants(ListPlantsRequest {}).await?.into_inner();

    let items: Vec<PlantListItem> = reply
        .plants
        .into_iter()
        .map(|p| PlantListItem {
            plant_id: p.plant_id,
            tiebreak: p.tiebreak,
            address: p.address,
            port: p.port,
        })
        .collect();

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No plants registered.");
            } else {
                println!("{:<12} {:<10} ADDRESS", "PLANT ID", "TIEBREAK");
                println!("{}", "-".repeat(48));
                for item in &items {
                    println!(
                        "{:<12} {:<10} {}:{}",
                        item.plant_id, item.tiebreak, item.address, item.port
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_status(addr: &str, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = PlantServiceClient::connect(addr.to_string()).await?;
    let reply = client.get_node_status(NodeStatusRequest {}).await?.into_inner();

    let out = StatusOutput {
        plant_id: reply.plant_id,
        status: reply.status,
        current_request_id: none_if_empty(reply.current_request_id),
        current_bid: reply.current_bid,
        next_id: none_if_empty(reply.next_id),
        prev_id: none_if_empty(reply.prev_id),
        pending_tokens: reply.pending_tokens,
        queued_demands: reply.queued_demands,
        processed_requests: reply.processed_requests,
        dropped_tokens: reply.dropped_tokens,
        duplicate_submissions: reply.duplicate_submissions,
        elections_started: reply.elections_started,
        elections_won: reply.elections_won,
        elections_relayed: reply.elections_relayed,
    };

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Plant {}", out.plant_id);
            println!("{}", "=".repeat(40));
            println!("Status:      {}", out.status);
            println!("Request:     {}", out.current_request_id.as_deref().unwrap_or("-"));
            println!("Bid:         {:.2}", out.current_bid);
            println!("Next:        {}", out.next_id.as_deref().unwrap_or("- (alone)"));
            println!("Prev:        {}", out.prev_id.as_deref().unwrap_or("- (alone)"));
            println!();
            println!("Pending tokens:        {}", out.pending_tokens);
            println!("Queued demands:        {}", out.queued_demands);
            println!("Processed requests:    {}", out.processed_requests);
            println!("Dropped tokens:        {}", out.dropped_tokens);
            println!("Duplicate submissions: {}", out.duplicate_submissions);
            println!(
                "Elections:             {} started / {} won / {} relayed",
                out.elections_started, out.elections_won, out.elections_relayed
            );
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Plant(plant_args) => {
            if let Err(e) = run_plant(plant_args).await {
                eprintln!("Error: {}", e);
                eprintln!("Hint: plant ids must be unique; pick a different --plant-id and retry.");
                std::process::exit(1);
            }
        }
        Commands::Admin(admin_args) => {
            run_admin_server(admin_args).await?;
        }
        Commands::Demand { client, command } => match command {
            DemandCommands::Submit { amount } => {
                handle_demand_submit(&client.addr, amount, &client.output).await?;
            }
            DemandCommands::List { all } => {
                handle_demand_list(&client.addr, all, &client.output).await?;
            }
        },
        Commands::Plants { client } => {
            handle_plants(&client.addr, &client.output).await?;
        }
        Commands::Status { plant, output } => {
            handle_status(&plant, &output).await?;
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "unisyncctl")]
#[command(about = "Inspect and drive a unisync server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Admin API base URL
    #[arg(
        short,
        long,
        global = true,
        env = "UNISYNC_URL",
        default_value = "http://localhost:8080"
    )]
    pub server: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check server health
    Status,
    /// List SyncState records
    List(ListArgs),
    /// Show one SyncState by storage name or external id
    Get(GetArgs),
    /// Register a config source
    Register(RegisterArgs),
    /// Unregister a config source
    Unregister(UnregisterArgs),
}

#[derive(clap::Args)]
pub struct ListArgs {
    /// Only this resource type (Rule, DnsRecord, List, Ruleset)
    #[arg(short = 't', long = "type")]
    pub resource_type: Option<String>,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Resource type (Rule, DnsRecord, List, Ruleset)
    pub resource_type: String,
    /// Storage name or real external id
    pub name: String,
}

#[derive(clap::Args)]
pub struct OwnerArgs {
    /// Kind of the contributing object
    #[arg(long, default_value = "Manual")]
    pub owner_kind: String,
    /// Name of the contributing object
    #[arg(long)]
    pub owner: String,
    /// Namespace of the contributing object (empty for cluster scope)
    #[arg(long, default_value = "")]
    pub namespace: String,
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// Resource type (Rule, DnsRecord, List, Ruleset)
    pub resource_type: String,
    #[command(flatten)]
    pub owner: OwnerArgs,
    /// Merge priority; lower wins
    #[arg(long, default_value_t = 0)]
    pub priority: i32,
    /// Account scope
    #[arg(long)]
    pub account: String,
    /// Zone scope
    #[arg(long)]
    pub zone: Option<String>,
    /// Credentials reference
    #[arg(long, default_value = "default")]
    pub credentials: String,
    /// Existing external id to adopt
    #[arg(long)]
    pub external_id: Option<String>,
    /// Natural key distinguishing several resources of one owner
    #[arg(long)]
    pub natural_key: Option<String>,
    /// Path to JSON config (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct UnregisterArgs {
    /// Resource type (Rule, DnsRecord, List, Ruleset)
    pub resource_type: String,
    /// Storage name or real external id
    pub name: String,
    #[command(flatten)]
    pub owner: OwnerArgs,
}

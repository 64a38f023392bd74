use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::resource::Kind;

#[derive(Parser)]
#[command(name = "pinestate")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative lifecycle management for Pinecone resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest declaring the desired resources
    #[arg(short = 'f', long, global = true, default_value = crate::manifest::MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// State file tracking what pinestate created
    #[arg(long, global = true, default_value = "pinestate.state.json")]
    pub state: PathBuf,

    /// API key for the control plane (indexes, collections)
    #[arg(long, global = true, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Bearer token for the admin API (projects, API keys)
    #[arg(long, global = true, env = "PINECONE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Create, update and delete resources to match the manifest
    Apply(ApplyArgs),

    /// Delete every tracked resource
    Destroy(DestroyArgs),

    /// Re-read tracked resources and drop the ones that no longer exist
    Refresh,

    /// Start tracking an existing resource
    Import(ImportArgs),

    /// Show tracked state (secrets masked)
    Show {
        /// Address to show, e.g. index.docs (default: all)
        address: Option<String>,
    },

    /// List remote resources of a kind, tracked or not
    List(ListArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Plan / Apply
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Limit to a kind (index) or one address (index.docs)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Plan from stored state without reading remote resources first
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Limit to a kind (index) or one address (index.docs)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of resources reconciled in parallel (default: from config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Delete and recreate resources whose changes cannot be made in place
    #[arg(long)]
    pub replace: bool,

    /// Plan from stored state without reading remote resources first
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Limit to a kind (index) or one address (index.docs)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Import
// ============================================================================

#[derive(Parser)]
pub struct ImportArgs {
    /// Resource kind
    #[arg(value_enum)]
    pub kind: Kind,

    /// Address to track it under, without the kind prefix (e.g. docs)
    pub address: String,

    /// Remote id: index or collection name, project id, or
    /// <project-id>:<key-id> for API keys
    pub id: String,
}

// ============================================================================
// List
// ============================================================================

#[derive(Parser)]
pub struct ListArgs {
    /// Resource kind
    #[arg(value_enum)]
    pub kind: Kind,

    /// Only show the resource with this name or id
    pub name: Option<String>,

    /// Project whose API keys to list
    #[arg(short, long, required_if_eq("kind", "api_key"))]
    pub project: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "pinestate", "-vv", "apply", "--target", "index.docs", "-j", "2", "--yes", "--replace",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("index.docs"));
        assert_eq!(args.jobs, Some(2));
        assert!(args.yes && args.replace && !args.no_refresh);
    }

    #[test]
    fn test_parse_import_kind() {
        let cli =
            Cli::try_parse_from(["pinestate", "import", "api_key", "ci", "proj-1:key-2"]).unwrap();
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.kind, Kind::ApiKey);
        assert_eq!(args.id, "proj-1:key-2");

        assert!(Cli::try_parse_from(["pinestate", "import", "widget", "a", "b"]).is_err());
    }

    #[test]
    fn test_global_paths() {
        let cli =
            Cli::try_parse_from(["pinestate", "plan", "-f", "infra/pinestate.toml"]).unwrap();
        assert_eq!(cli.manifest, PathBuf::from("infra/pinestate.toml"));
        assert_eq!(cli.state, PathBuf::from("pinestate.state.json"));
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from(["pinestate", "list", "index", "docs"]).unwrap();
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.kind, Kind::Index);
        assert_eq!(args.name.as_deref(), Some("docs"));

        let cli =
            Cli::try_parse_from(["pinestate", "list", "api_key", "--project", "proj-1"]).unwrap();
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.project.as_deref(), Some("proj-1"));
        assert!(Cli::try_parse_from(["pinestate", "list", "api_key"]).is_err());
    }
}

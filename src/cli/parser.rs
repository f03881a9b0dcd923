use crate::export::ExportFormat;
use clap::{Parser, Subcommand};

/// Command-line interface definition for punchsync
/// CLI application to sync attendance terminals into a SQLite ledger
#[derive(Parser)]
#[command(
    name = "punchsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Pull punches from Hikvision/ZKTeco terminals and keep check-in/check-out sessions in SQLite",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Use another configuration file
    #[arg(global = true, long = "config", value_name = "FILE")]
    pub config: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    /// Debug-level diagnostics on stderr
    #[arg(global = true, long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Show or validate the configuration file
    Config {
        #[arg(long = "print", help = "Print the current configuration")]
        print_config: bool,

        #[arg(long = "check", help = "Validate every configured device")]
        check: bool,
    },

    /// Manage the database (migrations, integrity checks, etc.)
    Db {
        #[arg(long = "migrate", help = "Run pending database migrations")]
        migrate: bool,

        #[arg(long = "check", help = "Check database integrity")]
        check: bool,

        #[arg(long = "vacuum", help = "Optimize the database using VACUUM")]
        vacuum: bool,

        #[arg(long = "info", help = "Show database information")]
        info: bool,
    },

    /// Print the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },

    /// Manage employees
    Employee {
        #[command(subcommand)]
        action: EmployeeAction,
    },

    /// Sync one device
    Sync {
        #[arg(long, help = "Configured device id")]
        device: String,

        #[arg(long, help = "Range start (RFC 3339 or YYYY-MM-DDTHH:MM:SS, UTC); default: from the cursor")]
        from: Option<String>,

        #[arg(long, requires = "from", help = "Range end; default: now")]
        to: Option<String>,
    },

    /// Sync every enabled device concurrently
    SyncAll,

    /// Show recent sync runs
    Runs {
        #[arg(long)]
        device: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show attendance sessions
    Sessions {
        #[arg(long, help = "Employee id")]
        employee: Option<i64>,

        #[arg(long, help = "Only sessions without a check-out")]
        open: bool,
    },

    /// Show the raw punch ledger of one employee
    Events {
        #[arg(long, help = "Employee id")]
        employee: i64,
    },

    /// Export attendance sessions
    Export {
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        #[arg(long, value_name = "FILE")]
        file: String,

        #[arg(long, help = "Employee id")]
        employee: Option<i64>,

        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show or reset a device's sync cursor
    Cursor {
        #[arg(long)]
        device: String,

        #[arg(long, help = "Forget the cursor; the next run starts from the initial lookback")]
        reset: bool,
    },
}

#[derive(Subcommand)]
pub enum EmployeeAction {
    /// Register an employee
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, help = "Code the terminal reports (employeeNo / user id)")]
        code: Option<String>,

        #[arg(long)]
        barcode: Option<String>,

        #[arg(long, default_value = crate::models::employee::DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// List employees
    List,
}

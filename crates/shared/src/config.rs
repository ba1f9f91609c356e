//! Application configuration management.
//!
//! Sources, lowest priority first:
//! 1. `config/default.toml`
//! 2. `config/{RUN_MODE}.toml`
//! 3. `TALLY__*` environment variables (`TALLY__POSTING__TIMEOUT_MS=2000`)

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Posting engine tunables.
    #[serde(default)]
    pub posting: PostingConfig,
    /// Canonical chart-of-accounts codes used by the built-in journal builders.
    #[serde(default)]
    pub chart: ChartConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL. Only the binaries require it.
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Posting engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingConfig {
    /// Prefix of ordinary journal codes (`JE-202610-0001`).
    #[serde(default = "default_journal_prefix")]
    pub journal_prefix: String,
    /// Prefix of reversing journal codes.
    #[serde(default = "default_reversal_prefix")]
    pub reversal_prefix: String,
    /// How many times code assignment is retried after a uniqueness collision.
    #[serde(default = "default_code_retry_attempts")]
    pub code_retry_attempts: u32,
    /// Base delay of the jittered backoff between code-assignment retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Time budget for persisting a journal.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            journal_prefix: default_journal_prefix(),
            reversal_prefix: default_reversal_prefix(),
            code_retry_attempts: default_code_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_journal_prefix() -> String {
    "JE".to_string()
}

fn default_reversal_prefix() -> String {
    "RV".to_string()
}

fn default_code_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    25
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// An account addressed by business code, with ordered aliases to try when
/// the primary code has been renumbered away.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountCodes {
    /// Canonical code.
    pub primary: String,
    /// Aliases tried in order after `primary`.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl AccountCodes {
    fn with_aliases(primary: &str, fallbacks: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            fallbacks: fallbacks.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Chart-of-accounts codes for the accounts the built-in builders post to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Cash on hand.
    pub cash: AccountCodes,
    /// Default bank account.
    pub bank: AccountCodes,
    /// Trade receivables.
    pub receivable: AccountCodes,
    /// Sales revenue.
    pub revenue: AccountCodes,
    /// Output tax (VAT) payable.
    pub output_tax: AccountCodes,
    /// Withholding tax payable.
    pub withholding_tax: AccountCodes,
    /// Cost of goods sold.
    pub cogs: AccountCodes,
    /// Merchandise inventory.
    pub inventory: AccountCodes,
    /// Trade payables.
    pub payable: AccountCodes,
    /// Input tax (VAT) paid on purchases.
    pub input_tax: AccountCodes,
    /// Employee income tax withheld on purchases.
    pub pph21_payable: AccountCodes,
    /// Service income tax withheld on purchases.
    pub pph23_payable: AccountCodes,
    /// Owner equity; default counter account of deposits and opening balances.
    pub owner_equity: AccountCodes,
    /// Default counter account of withdrawals.
    pub general_expense: AccountCodes,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            cash: AccountCodes::with_aliases("1101", &["1100"]),
            bank: AccountCodes::with_aliases("1102", &["1104"]),
            receivable: AccountCodes::with_aliases("1201", &["1200"]),
            revenue: AccountCodes::with_aliases("4101", &["4100"]),
            output_tax: AccountCodes::with_aliases("2103", &["2102"]),
            withholding_tax: AccountCodes::with_aliases("2104", &[]),
            cogs: AccountCodes::with_aliases("5101", &["5100"]),
            inventory: AccountCodes::with_aliases("1301", &["1300"]),
            payable: AccountCodes::with_aliases("2101", &[]),
            input_tax: AccountCodes::with_aliases("1240", &["2102"]),
            pph21_payable: AccountCodes::with_aliases("2111", &[]),
            pph23_payable: AccountCodes::with_aliases("2112", &[]),
            owner_equity: AccountCodes::with_aliases("3101", &[]),
            general_expense: AccountCodes::with_aliases("5900", &[]),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "tally=info".to_string()
}

impl AppConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("chart.cash.fallbacks")
                    .with_list_parse_key("chart.bank.fallbacks")
                    .with_list_parse_key("chart.receivable.fallbacks")
                    .with_list_parse_key("chart.revenue.fallbacks")
                    .with_list_parse_key("chart.output_tax.fallbacks")
                    .with_list_parse_key("chart.withholding_tax.fallbacks")
                    .with_list_parse_key("chart.cogs.fallbacks")
                    .with_list_parse_key("chart.inventory.fallbacks")
                    .with_list_parse_key("chart.payable.fallbacks")
                    .with_list_parse_key("chart.input_tax.fallbacks")
                    .with_list_parse_key("chart.pph21_payable.fallbacks")
                    .with_list_parse_key("chart.pph23_payable.fallbacks")
                    .with_list_parse_key("chart.owner_equity.fallbacks")
                    .with_list_parse_key("chart.general_expense.fallbacks")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Returns the database URL or a configuration error naming the missing key.
    pub fn database_url(&self) -> Result<&str, config::ConfigError> {
        self.database
            .url
            .as_deref()
            .ok_or_else(|| config::ConfigError::NotFound("database.url".to_string()))
    }
}

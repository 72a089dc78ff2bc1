use clap::{Args, Parser, Subcommand};
use export::types::LogicalDate;

/// Exports one day of vendor session data into the warehouse.
#[derive(Debug, Parser)]
#[command(
    name = "exporter",
    about = "Exports one day of vendor session data into the warehouse"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transform the session files the vendor streamed into an S3 bucket
    Stream(StreamArgs),
    /// Request the day from the vendor export API and load the files it produces
    Historical(RunArgs),
    /// Snapshot the vendor's message definitions into the day's partition
    Messages(RunArgs),
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Stream(args) => &args.run,
            Command::Historical(args) | Command::Messages(args) => args,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Stream(_) => "stream",
            Command::Historical(_) => "historical",
            Command::Messages(_) => "messages",
        }
    }

    /// Returns whether the command calls the vendor API.
    pub fn uses_vendor_api(&self) -> bool {
        matches!(self, Command::Historical(_) | Command::Messages(_))
    }
}

/// Arguments shared by every command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Day to export, as YYYYMMDD
    #[arg(long, value_parser = parse_date)]
    pub date: LogicalDate,

    /// Bucket receiving the staged files
    #[arg(long)]
    pub bucket: String,

    /// Key prefix of source and staged files
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Dataset of the destination tables
    #[arg(long)]
    pub bq_dataset: String,

    /// Google Cloud project, overrides `gcp.project_id`
    #[arg(long)]
    pub project: Option<String>,

    /// Prefix prepended to every destination table name
    #[arg(long)]
    pub table_prefix: Option<String>,

    /// Version of the staged layout and destination tables
    #[arg(long, default_value_t = 1)]
    pub version: u32,
}

#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Bucket the vendor streams session files to
    #[arg(long)]
    pub s3_bucket: String,

    /// Remove staged files and import markers of the day before processing
    #[arg(long)]
    pub clean: bool,
}

fn parse_date(value: &str) -> Result<LogicalDate, String> {
    value.parse::<LogicalDate>().map_err(|err| {
        let description = err.description().unwrap_or("invalid date");
        match err.detail() {
            Some(detail) => format!("{description}: {detail}"),
            None => description.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_command() {
        let cli = Cli::try_parse_from([
            "exporter",
            "stream",
            "--date",
            "20200601",
            "--bucket",
            "staging",
            "--bq-dataset",
            "leanplum",
            "--s3-bucket",
            "vendor-stream",
            "--clean",
        ])
        .unwrap();

        let Command::Stream(args) = &cli.command else {
            panic!("expected the stream command");
        };
        assert_eq!(args.run.date.to_string(), "20200601");
        assert_eq!(args.run.prefix, "");
        assert_eq!(args.run.version, 1);
        assert_eq!(args.run.table_prefix, None);
        assert_eq!(args.run.project, None);
        assert_eq!(args.s3_bucket, "vendor-stream");
        assert!(args.clean);
    }

    #[test]
    fn parses_historical_command() {
        let cli = Cli::try_parse_from([
            "exporter",
            "historical",
            "--date",
            "20200601",
            "--bucket",
            "staging",
            "--prefix",
            "firefox",
            "--bq-dataset",
            "leanplum",
            "--project",
            "analytics",
            "--table-prefix",
            "fenix",
            "--version",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.command.name(), "historical");
        let args = cli.command.run_args();
        assert_eq!(args.prefix, "firefox");
        assert_eq!(args.table_prefix.as_deref(), Some("fenix"));
        assert_eq!(args.project.as_deref(), Some("analytics"));
        assert_eq!(args.version, 2);
    }

    #[test]
    fn parses_messages_command() {
        let cli = Cli::try_parse_from([
            "exporter",
            "messages",
            "--date",
            "20200601",
            "--bucket",
            "staging",
            "--bq-dataset",
            "leanplum",
            "--table-prefix",
            "firefox",
        ])
        .unwrap();

        assert_eq!(cli.command.name(), "messages");
        assert!(cli.command.uses_vendor_api());
        let args = cli.command.run_args();
        assert_eq!(args.date.to_string(), "20200601");
        assert_eq!(args.table_prefix.as_deref(), Some("firefox"));
        assert_eq!(args.version, 1);
    }

    #[test]
    fn rejects_malformed_date() {
        let result = Cli::try_parse_from([
            "exporter",
            "historical",
            "--date",
            "2020-06-01",
            "--bucket",
            "staging",
            "--bq-dataset",
            "leanplum",
        ]);

        assert!(result.is_err());
    }
}

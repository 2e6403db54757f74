use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Sales scoreboard server")]
pub struct Cli {
    /// Seconds between CRM polls (overrides `POLL_INTERVAL_SECS`)
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// HTTP API port (overrides `SERVER_API_PORT`)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Pull the agent roster from the CRM before the first poll
    #[arg(long)]
    pub sync_agents: bool,
}

pub fn parse_cli_args() -> Cli {
    let args = Cli::parse();
    tracing::debug!(?args, "parsed command line");

    args
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cli_args() {
        let args = Cli::try_parse_from(["floorboard-server", "-i", "15", "--sync-agents"]).unwrap();
        assert_eq!(args.poll_interval, Some(15));
        assert_eq!(args.port, None);
        assert!(args.sync_agents);

        let defaults = Cli::try_parse_from(["floorboard-server"]).unwrap();
        assert_eq!(defaults.poll_interval, None);
        assert!(!defaults.sync_agents);

        assert!(Cli::try_parse_from(["floorboard-server", "--poll-interval", "0"]).is_err());
    }
}
